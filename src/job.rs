use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::track_file;
use crate::region::RegionPolicy;
use crate::solver::{SolverConfig, SolverInputs, WindModel, days_to_seconds};
use crate::track::Track;

pub const JOB_TYPE: &str = "storm-surge";

// Shared by every job of a batch. Each track runs once per wind model.
#[derive(Debug, Clone)]
pub struct JobParams {
    pub wind_models: Vec<WindModel>,
    pub refinement_level: u32,
    pub region: Option<Arc<dyn RegionPolicy>>,
    pub ensemble_type: String,
    pub tracks_dir: PathBuf,
    pub restart: bool,
    pub restart_file: String,
    pub solver_settings: BTreeMap<String, String>,
}

impl JobParams {
    pub fn new(
        wind_model: WindModel,
        refinement_level: u32,
        region: Arc<dyn RegionPolicy>,
        tracks_dir: impl Into<PathBuf>,
    ) -> Self {
        JobParams {
            wind_models: vec![wind_model],
            refinement_level,
            region: Some(region),
            ensemble_type: "Synthetic".to_string(),
            tracks_dir: tracks_dir.into(),
            restart: false,
            restart_file: "fort.chk00006".to_string(),
            solver_settings: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub job_dir: PathBuf,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub plots_dir: PathBuf,
    pub log_path: PathBuf,
    pub script_path: PathBuf,
}

pub fn format_prefix(run_index: usize) -> String {
    format!("{:04}", run_index)
}

pub fn job_name(wind_model: WindModel, refinement_level: u32) -> String {
    format!("{}-amr{}", wind_model, refinement_level)
}

/// Reference time of a storm file: the first sample inside the region's
/// domain, or the first sample when the region has no domain.
pub fn storm_time_offset(track: &Track, region: &dyn RegionPolicy) -> Option<NaiveDateTime> {
    match region.domain() {
        Some(domain) => track.first_entry(&domain),
        None => track.timestamps.first().copied(),
    }
}

#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub run_index: usize,
    pub prefix: String,
    pub name: String,
    pub job_type: String,
    pub region: String,
    pub ensemble_type: String,
    pub wind_model: WindModel,
    pub refinement_level: u32,
    pub track: Track,
    pub storm_file: PathBuf,
    pub solver: SolverConfig,
}

impl JobDescriptor {
    /// Validate `params` and write the track to its storm file. Nothing
    /// touches the filesystem unless validation succeeds.
    pub fn build(
        run_index: usize,
        track: Track,
        wind_model: WindModel,
        params: &JobParams,
    ) -> Result<Self> {
        let region = params
            .region
            .as_ref()
            .ok_or_else(|| Error::config("region is not set"))?;
        if params.refinement_level == 0 {
            return Err(Error::config("refinement level must be positive"));
        }
        let first = *track
            .timestamps
            .first()
            .ok_or_else(|| Error::config(format!("track {} has no samples", track.id)))?;

        let prefix = format_prefix(run_index);
        let name = job_name(wind_model, params.refinement_level);
        let storm_file_name = format!("{}_{}.storm", region.label(), prefix);
        let storm_file = params.tracks_dir.join(storm_file_name);

        let elapsed = track.duration();
        let days = elapsed.num_days();
        let tfinal = days_to_seconds(days as f64) + (elapsed.num_seconds() - days * 86400) as f64;

        let solver = SolverConfig::build(&SolverInputs {
            wind_model,
            refinement_level: params.refinement_level,
            storm_file: storm_file.clone(),
            tfinal,
            restart: params.restart,
            restart_file: &params.restart_file,
            gauges: region.gauges(),
            regions: region.regions(),
            settings: &params.solver_settings,
        });

        let time_offset = storm_time_offset(&track, &**region).unwrap_or(first);

        fs::create_dir_all(&params.tracks_dir).map_err(|e| Error::fs(&params.tracks_dir, e))?;
        track_file::write_geoclaw(&storm_file, &track, time_offset)?;
        debug!(run_index, storm_file = %storm_file.display(), "wrote storm file");

        Ok(JobDescriptor {
            run_index,
            prefix,
            name,
            job_type: JOB_TYPE.to_string(),
            region: region.label().to_string(),
            ensemble_type: params.ensemble_type.clone(),
            wind_model,
            refinement_level: params.refinement_level,
            track,
            storm_file,
            solver,
        })
    }

    pub fn storm_name(&self) -> &str {
        &self.track.id
    }

    pub fn is_restart(&self) -> bool {
        self.solver.restart
    }

    /// `<base>/<type>/<region>/<name>/<prefix>_{data,output,plots}`, plus
    /// `<prefix>_log.txt` and `<prefix>_run.sh` next to them.
    pub fn layout(&self, base_path: &Path) -> OutputLayout {
        let job_dir = base_path
            .join(&self.job_type)
            .join(&self.region)
            .join(&self.name);
        let prefixed = |suffix: &str| job_dir.join(format!("{}{}", self.prefix, suffix));
        OutputLayout {
            data_dir: prefixed("_data"),
            output_dir: prefixed("_output"),
            plots_dir: prefixed("_plots"),
            log_path: prefixed("_log.txt"),
            script_path: prefixed("_run.sh"),
            job_dir,
        }
    }
}

impl fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<20}: {:<15}", "Job", format!("{}/{}", self.job_type, self.name))?;
        writeln!(f, "{:<20}: {:<15}", "Region", self.region)?;
        writeln!(f, "{:<20}: {:<15}", "Wind Model", self.wind_model)?;
        writeln!(f, "{:<20}: {:<15}", "Storm Format", self.ensemble_type)?;
        writeln!(f, "{:<20}: {:<15}", "Storm", self.storm_name())?;
        write!(f, "{:<20}: {:<15}", "Number", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionProfile;
    use crate::track::tests::hourly_track;

    fn params(tracks_dir: &Path) -> JobParams {
        JobParams::new(
            WindModel::Holland80,
            2,
            Arc::new(RegionProfile::square_basin()),
            tracks_dir,
        )
    }

    #[test]
    fn prefix_is_zero_padded_to_four_digits() {
        assert_eq!(format_prefix(7), "0007");
        assert_eq!(format_prefix(1234), "1234");
        assert_eq!(format_prefix(12345), "12345");
    }

    #[test]
    fn build_derives_names_and_writes_storm_file() {
        let dir = tempfile::tempdir().unwrap();
        let track = hourly_track("synthetic_7", &[30.0, 31.0, 32.0, 31.0, 30.0]);
        let job = JobDescriptor::build(7, track, WindModel::Holland80, &params(dir.path())).unwrap();

        assert_eq!(job.prefix, "0007");
        assert_eq!(job.name, "holland80-amr2");
        assert_eq!(job.storm_file, dir.path().join("SquareBasin_0007.storm"));
        assert!(job.storm_file.exists());
        assert_eq!(job.solver.t0, 0.0);
        assert_eq!(job.solver.tfinal, 86_400.0);
        assert_eq!(job.solver.amr_levels_max, 2);
        assert_eq!(job.solver.storm_specification_type, WindModel::Holland80);
        assert!(job.solver.gauges.is_empty());
    }

    #[test]
    fn missing_region_or_level_fails_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let tracks = dir.path().join("tracks");
        let track = hourly_track("t", &[30.0, 31.0]);

        let mut no_region = params(&tracks);
        no_region.region = None;
        let err = JobDescriptor::build(0, track.clone(), WindModel::Cle, &no_region).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let mut no_level = params(&tracks);
        no_level.refinement_level = 0;
        let err = JobDescriptor::build(0, track, WindModel::Cle, &no_level).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        assert!(!tracks.exists());
    }

    #[test]
    fn region_gauges_are_attached_with_run_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = params(dir.path());
        p.region = Some(Arc::new(RegionProfile::mumbai()));
        let track = hourly_track("t", &[30.0, 31.0, 32.0]);
        let job = JobDescriptor::build(3, track, WindModel::Holland80, &p).unwrap();

        assert_eq!(job.region, "Mumbai");
        assert_eq!(job.solver.gauges.len(), 4);
        assert_eq!(job.solver.gauges[3].id, 4);
        assert_eq!(job.solver.gauges[3].t2, job.solver.tfinal);
        assert_eq!(job.solver.regions.len(), 2);
    }

    #[test]
    fn layout_follows_directory_contract() {
        let dir = tempfile::tempdir().unwrap();
        let track = hourly_track("t", &[30.0, 31.0]);
        let job = JobDescriptor::build(12, track, WindModel::Holland80, &params(dir.path())).unwrap();
        let layout = job.layout(Path::new("/scratch"));

        let job_dir = Path::new("/scratch/storm-surge/SquareBasin/holland80-amr2");
        assert_eq!(layout.job_dir, job_dir);
        assert_eq!(layout.data_dir, job_dir.join("0012_data"));
        assert_eq!(layout.output_dir, job_dir.join("0012_output"));
        assert_eq!(layout.plots_dir, job_dir.join("0012_plots"));
        assert_eq!(layout.log_path, job_dir.join("0012_log.txt"));
        assert_eq!(layout.script_path, job_dir.join("0012_run.sh"));
    }

    #[test]
    fn regions_and_wind_models_get_separate_job_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let track = hourly_track("t", &[30.0, 31.0]);
        let base = Path::new("/scratch");

        let basin = params(dir.path());
        let mut mumbai = params(dir.path());
        mumbai.region = Some(Arc::new(RegionProfile::mumbai()));

        let a = JobDescriptor::build(0, track.clone(), WindModel::Holland80, &basin).unwrap();
        let b = JobDescriptor::build(0, track.clone(), WindModel::Holland80, &mumbai).unwrap();
        let c = JobDescriptor::build(0, track, WindModel::Slosh, &basin).unwrap();

        let (a, b, c) = (a.layout(base), b.layout(base), c.layout(base));
        assert_ne!(a.data_dir, b.data_dir);
        assert_ne!(a.data_dir, c.data_dir);
        assert_eq!(
            b.data_dir,
            Path::new("/scratch/storm-surge/Mumbai/holland80-amr2/0000_data")
        );
        assert_eq!(
            c.data_dir,
            Path::new("/scratch/storm-surge/SquareBasin/SLOSH-amr2/0000_data")
        );
    }
}
