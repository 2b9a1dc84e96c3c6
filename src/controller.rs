use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::io::registry::{JobRegistry, SubmissionStatus};
use crate::job::{JobDescriptor, OutputLayout};
use crate::scheduler::{Scheduler, SubmissionRequest};
use crate::script::{self, ScriptSettings};
use crate::workdir;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    Continue,
    Abort,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub base_path: PathBuf,
    pub script: ScriptSettings,
    pub failure_policy: FailurePolicy,
    pub show_progress: bool,
}

#[derive(Debug)]
pub struct JobFailure {
    pub run_index: usize,
    pub prefix: String,
    pub name: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub paths: Vec<OutputLayout>,
    pub submitted: Vec<usize>,
    pub failures: Vec<JobFailure>,
}

impl BatchReport {
    pub fn merge(&mut self, other: BatchReport) {
        self.paths.extend(other.paths);
        self.submitted.extend(other.submitted);
        self.failures.extend(other.failures);
    }
}

pub struct BatchController<'a> {
    jobs: Vec<JobDescriptor>,
    options: &'a ControllerOptions,
    registry: Option<&'a JobRegistry>,
}

impl<'a> BatchController<'a> {
    pub fn new(jobs: Vec<JobDescriptor>, options: &'a ControllerOptions) -> Self {
        BatchController {
            jobs,
            options,
            registry: None,
        }
    }

    pub fn with_registry(mut self, registry: Option<&'a JobRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Fail before any filesystem work if two jobs would share a data
    /// directory; the clobber step of one would wipe the other's inputs.
    fn check_unique_layouts(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for job in &self.jobs {
            let layout = job.layout(&self.options.base_path);
            if !seen.insert(layout.data_dir.clone()) {
                return Err(Error::config(format!(
                    "job {} collides with another job at {}",
                    job.prefix,
                    layout.data_dir.display()
                )));
            }
        }
        Ok(())
    }

    pub fn run(&self, scheduler: &mut dyn Scheduler) -> Result<BatchReport> {
        self.check_unique_layouts()?;

        let pb = if self.options.show_progress {
            ProgressBar::new(self.jobs.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );

        let mut report = BatchReport::default();
        for job in &self.jobs {
            let layout = job.layout(&self.options.base_path);
            let outcome = self.run_job(job, &layout, scheduler, &mut report);
            pb.inc(1);

            let status = match &outcome {
                Ok(()) if scheduler.is_dry_run() => SubmissionStatus::DryRun,
                Ok(()) => SubmissionStatus::Submitted,
                Err(e) => SubmissionStatus::Failed(e.to_string()),
            };
            if let Some(registry) = self.registry {
                // Registry errors never stop the batch.
                if let Err(e) = registry.record(job, &layout, &status) {
                    warn!(prefix = %job.prefix, error = %e, "could not record job");
                }
            }

            match outcome {
                Ok(()) => report.submitted.push(job.run_index),
                Err(e) => {
                    error!(prefix = %job.prefix, error = %e, "job failed");
                    match self.options.failure_policy {
                        FailurePolicy::Abort => {
                            pb.abandon();
                            return Err(e);
                        }
                        FailurePolicy::Continue => report.failures.push(JobFailure {
                            run_index: job.run_index,
                            prefix: job.prefix.clone(),
                            name: job.name.clone(),
                            error: e,
                        }),
                    }
                }
            }
        }
        pb.finish();

        info!(
            submitted = report.submitted.len(),
            failed = report.failures.len(),
            "batch handed to scheduler"
        );
        Ok(report)
    }

    fn run_job(
        &self,
        job: &JobDescriptor,
        layout: &OutputLayout,
        scheduler: &mut dyn Scheduler,
        report: &mut BatchReport,
    ) -> Result<()> {
        fs::create_dir_all(&layout.job_dir).map_err(|e| Error::fs(&layout.job_dir, e))?;
        report.paths.push(layout.clone());

        if layout.data_dir.exists() {
            if !job.is_restart() {
                clobber_data_files(&layout.data_dir)?;
            }
        } else {
            fs::create_dir(&layout.data_dir).map_err(|e| Error::fs(&layout.data_dir, e))?;
        }

        workdir::scoped(&layout.data_dir, |ctx| job.solver.write(ctx))?;

        let rendered = script::render(job, layout, &self.options.script, &self.options.base_path);
        fs::write(&layout.script_path, rendered).map_err(|e| Error::fs(&layout.script_path, e))?;
        debug!(script = %layout.script_path.display(), "wrote run script");

        scheduler.submit(&SubmissionRequest {
            prefix: job.prefix.clone(),
            script_path: layout.script_path.clone(),
            log_path: layout.log_path.clone(),
        })?;
        Ok(())
    }
}

pub fn clobber_data_files(data_dir: &Path) -> Result<usize> {
    let entries = fs::read_dir(data_dir).map_err(|e| Error::fs(data_dir, e))?;
    let mut removed = 0;
    for entry in entries {
        let path = entry.map_err(|e| Error::fs(data_dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "data") {
            fs::remove_file(&path).map_err(|e| Error::fs(&path, e))?;
            removed += 1;
        }
    }
    debug!(dir = %data_dir.display(), removed, "clobbered data files");
    Ok(removed)
}

impl fmt::Display for BatchController<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.options.script;
        writeln!(f, "Batch Controller")?;
        writeln!(f, "  {:<18}: {}", "Base path", self.options.base_path.display())?;
        writeln!(f, "  {:<18}: {}", "Jobs", self.jobs.len())?;
        writeln!(f, "  {:<18}: {}", "Account", s.account)?;
        writeln!(f, "  {:<18}: {}", "Queue", s.queue)?;
        writeln!(f, "  {:<18}: {}", "Wall time", s.wall_time)?;
        writeln!(f, "  {:<18}: {}", "OMP threads", s.omp_num_threads)?;
        writeln!(f, "  {:<18}: {:?}", "On failure", self.options.failure_policy)?;
        if let Some(email) = &s.email {
            writeln!(f, "  {:<18}: {}", "Notify", email)?;
        }
        if let (Some(first), Some(last)) = (self.jobs.first(), self.jobs.last()) {
            write!(f, "  {:<18}: {} .. {}", "Prefixes", first.prefix, last.prefix)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobParams;
    use crate::region::RegionProfile;
    use crate::scheduler::{CommandScheduler, DryRunScheduler};
    use crate::solver::WindModel;
    use crate::track::tests::hourly_track;
    use std::sync::Arc;

    fn options(base: &Path) -> ControllerOptions {
        ControllerOptions {
            base_path: base.to_path_buf(),
            script: ScriptSettings {
                omp_num_threads: 4,
                ..ScriptSettings::default()
            },
            failure_policy: FailurePolicy::Continue,
            show_progress: false,
        }
    }

    fn jobs(tracks: &Path, indices: &[usize], restart: bool) -> Vec<JobDescriptor> {
        let mut params = JobParams::new(
            WindModel::Holland80,
            2,
            Arc::new(RegionProfile::square_basin()),
            tracks,
        );
        params.restart = restart;
        indices
            .iter()
            .map(|&i| {
                let track = hourly_track(&format!("synthetic_{i}"), &[30.0, 31.0, 32.0]);
                JobDescriptor::build(i, track, WindModel::Holland80, &params).unwrap()
            })
            .collect()
    }

    #[test]
    fn lays_out_each_job_and_submits_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(&dir.path().join("base"));
        let controller = BatchController::new(jobs(&dir.path().join("tracks"), &[0, 1], false), &opts);
        let mut scheduler = DryRunScheduler::default();

        let report = controller.run(&mut scheduler).unwrap();
        assert_eq!(report.submitted, vec![0, 1]);
        assert!(report.failures.is_empty());
        assert_eq!(report.paths.len(), 2);
        for layout in &report.paths {
            assert!(layout.data_dir.join("claw.data").exists());
            assert!(layout.script_path.exists());
        }
        let prefixes: Vec<&str> = scheduler.requests.iter().map(|r| r.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["0000", "0001"]);
    }

    #[test]
    fn non_restart_clobbers_stale_data_files() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(&dir.path().join("base"));
        let batch = jobs(&dir.path().join("tracks"), &[3], false);
        let data_dir = batch[0].layout(&opts.base_path).data_dir;
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(data_dir.join("stale.data"), "old").unwrap();
        fs::write(data_dir.join("fort.chk00006"), "checkpoint").unwrap();

        BatchController::new(batch, &opts)
            .run(&mut DryRunScheduler::default())
            .unwrap();
        assert!(!data_dir.join("stale.data").exists());
        assert!(data_dir.join("fort.chk00006").exists());
        assert!(data_dir.join("claw.data").exists());
    }

    #[test]
    fn restart_leaves_existing_data_files() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(&dir.path().join("base"));
        let batch = jobs(&dir.path().join("tracks"), &[3], true);
        let data_dir = batch[0].layout(&opts.base_path).data_dir;
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(data_dir.join("stale.data"), "old").unwrap();

        BatchController::new(batch, &opts)
            .run(&mut DryRunScheduler::default())
            .unwrap();
        assert!(data_dir.join("stale.data").exists());
    }

    #[test]
    fn duplicate_layouts_are_rejected_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let opts = options(&base);
        let mut batch = jobs(&dir.path().join("tracks"), &[4], false);
        batch.push(batch[0].clone());

        let err = BatchController::new(batch, &opts)
            .run(&mut DryRunScheduler::default())
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(!base.exists());
    }

    #[test]
    fn failure_policy_decides_whether_to_continue() {
        let dir = tempfile::tempdir().unwrap();
        let tracks = dir.path().join("tracks");

        let mut opts = options(&dir.path().join("continue"));
        let mut failing = CommandScheduler::new("false").unwrap();
        let report = BatchController::new(jobs(&tracks, &[0, 1, 2], false), &opts)
            .run(&mut failing)
            .unwrap();
        assert!(report.submitted.is_empty());
        assert_eq!(report.failures.len(), 3);
        assert!(matches!(report.failures[0].error, Error::Submission { .. }));

        opts.base_path = dir.path().join("abort");
        opts.failure_policy = FailurePolicy::Abort;
        let registry = JobRegistry::open_in_memory().unwrap();
        let err = BatchController::new(jobs(&tracks, &[0, 1, 2], false), &opts)
            .with_registry(Some(&registry))
            .run(&mut failing)
            .unwrap_err();
        assert!(matches!(err, Error::Submission { .. }));
        let records = registry.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "failed");
    }

    #[test]
    fn registry_errors_do_not_stop_submission() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("jobs.sqlite");
        // A pre-existing table lacking most columns makes every insert fail.
        rusqlite::Connection::open(&db)
            .unwrap()
            .execute_batch("CREATE TABLE jobs (run_index INTEGER);")
            .unwrap();
        let registry = JobRegistry::open(&db).unwrap();

        let mut opts = options(&dir.path().join("base"));
        opts.failure_policy = FailurePolicy::Abort;
        let mut scheduler = DryRunScheduler::default();
        let report = BatchController::new(jobs(&dir.path().join("tracks"), &[0, 1], false), &opts)
            .with_registry(Some(&registry))
            .run(&mut scheduler)
            .unwrap();
        assert_eq!(report.submitted, vec![0, 1]);
        assert_eq!(scheduler.requests.len(), 2);
    }

    #[test]
    fn clobber_only_touches_data_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.data"), "").unwrap();
        fs::write(dir.path().join("b.data"), "").unwrap();
        fs::write(dir.path().join("c.txt"), "").unwrap();
        assert_eq!(clobber_data_files(dir.path()).unwrap(), 2);
        assert!(dir.path().join("c.txt").exists());
    }
}
