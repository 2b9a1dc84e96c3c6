use std::ops::Range;
use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::controller::{BatchController, BatchReport, ControllerOptions, FailurePolicy, JobFailure};
use crate::error::{Error, Result};
use crate::io::registry::JobRegistry;
use crate::io::run_log::RunLog;
use crate::job::{JobDescriptor, JobParams, format_prefix, job_name};
use crate::perturb::TrackPerturbationEngine;
use crate::scheduler::Scheduler;
use crate::solver::WindModel;
use crate::track::Track;

// [first_storm, last_storm)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchChunk {
    pub first_storm: usize,
    pub last_storm: usize,
}

impl BatchChunk {
    pub fn len(&self) -> usize {
        self.last_storm - self.first_storm
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.first_storm..self.last_storm
    }
}

pub fn plan(total_storms: usize, quota: usize) -> Result<Vec<BatchChunk>> {
    plan_range(0..total_storms, quota)
}

pub fn plan_range(range: Range<usize>, quota: usize) -> Result<Vec<BatchChunk>> {
    if quota == 0 {
        return Err(Error::config("batch quota must be positive"));
    }
    let mut chunks = Vec::new();
    let mut i = range.start;
    while i < range.end {
        let last = (i + quota).min(range.end);
        chunks.push(BatchChunk {
            first_storm: i,
            last_storm: last,
        });
        i = last;
    }
    Ok(chunks)
}

pub enum EnsembleSource {
    Provided(Vec<Track>),
    Synthetic {
        engine: TrackPerturbationEngine,
        control: Track,
        size: usize,
        generated: usize,
    },
}

impl EnsembleSource {
    pub fn synthetic(engine: TrackPerturbationEngine, control: &Track, size: usize) -> Self {
        let control = engine.prepare_control(control);
        EnsembleSource::Synthetic {
            engine,
            control,
            size,
            generated: 0,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EnsembleSource::Provided(tracks) => tracks.len(),
            EnsembleSource::Synthetic { size, .. } => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracks for `chunk`. Synthetic members are drawn in index order, so a
    /// member's perturbation does not depend on how the ensemble is chunked
    /// or where the run starts.
    pub fn tracks_for(&mut self, chunk: &BatchChunk) -> Result<Vec<Track>> {
        if chunk.last_storm > self.len() {
            return Err(Error::config(format!(
                "chunk [{}, {}) exceeds ensemble of {}",
                chunk.first_storm,
                chunk.last_storm,
                self.len()
            )));
        }
        match self {
            EnsembleSource::Provided(tracks) => Ok(tracks[chunk.range()].to_vec()),
            EnsembleSource::Synthetic {
                engine,
                control,
                generated,
                ..
            } => {
                if chunk.first_storm < *generated {
                    return Err(Error::config(format!(
                        "synthetic member {} was already drawn",
                        chunk.first_storm
                    )));
                }
                if chunk.first_storm > *generated {
                    // Burn the draws of skipped members.
                    engine.generate(control, *generated, chunk.first_storm - *generated);
                }
                let tracks = engine.generate(control, chunk.first_storm, chunk.len());
                *generated = chunk.last_storm;
                Ok(tracks)
            }
        }
    }
}

/// Drives one controller run per quota-sized chunk, in order. Every track of
/// a chunk runs once per configured wind model.
pub struct BatchPlanner<'a> {
    pub quota: usize,
    pub params: &'a JobParams,
    pub options: &'a ControllerOptions,
    pub registry: Option<&'a JobRegistry>,
}

impl<'a> BatchPlanner<'a> {
    // <base>/<region>/<wind_model>-amr<level>-<first>-<last>/run_log.txt
    pub fn run_log_path(&self, chunk: &BatchChunk, wind_model: WindModel) -> Result<PathBuf> {
        let region = self
            .params
            .region
            .as_ref()
            .ok_or_else(|| Error::config("region is not set"))?;
        Ok(self
            .options
            .base_path
            .join(region.label())
            .join(format!(
                "{}-{}-{}",
                job_name(wind_model, self.params.refinement_level),
                chunk.first_storm,
                chunk.last_storm
            ))
            .join("run_log.txt"))
    }

    pub fn run(
        &self,
        source: &mut EnsembleSource,
        range: Range<usize>,
        scheduler: &mut dyn Scheduler,
    ) -> Result<BatchReport> {
        if self.params.wind_models.is_empty() {
            return Err(Error::config("wind model is not set"));
        }
        let chunks = plan_range(range, self.quota)?;
        let mut report = BatchReport::default();

        for chunk in &chunks {
            info!(
                first = chunk.first_storm,
                last = chunk.last_storm,
                models = self.params.wind_models.len(),
                "preparing chunk"
            );
            let tracks = source.tracks_for(chunk)?;

            let mut jobs = Vec::with_capacity(tracks.len() * self.params.wind_models.len());
            for &wind_model in &self.params.wind_models {
                let mut run_log = RunLog::create(&self.run_log_path(chunk, wind_model)?)?;

                for (offset, track) in tracks.iter().enumerate() {
                    let run_index = chunk.first_storm + offset;
                    run_log.record(run_index, &track.id)?;

                    match JobDescriptor::build(run_index, track.clone(), wind_model, self.params) {
                        Ok(job) => {
                            debug!("\n{}", job);
                            jobs.push(job);
                        }
                        Err(e) => {
                            error!(run_index, %wind_model, error = %e, "could not build job");
                            match self.options.failure_policy {
                                FailurePolicy::Abort => return Err(e),
                                FailurePolicy::Continue => report.failures.push(JobFailure {
                                    run_index,
                                    prefix: format_prefix(run_index),
                                    name: job_name(wind_model, self.params.refinement_level),
                                    error: e,
                                }),
                            }
                        }
                    }
                }
            }

            let controller = BatchController::new(jobs, self.options).with_registry(self.registry);
            debug!("\n{}", controller);
            report.merge(controller.run(scheduler)?);
        }

        Ok(report)
    }
}
