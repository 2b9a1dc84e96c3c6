use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::controller::{ControllerOptions, FailurePolicy};
use crate::error::{Error, Result};
use crate::io::track_file::{self, TrackDialect};
use crate::job::JobParams;
use crate::perturb::{PerturbationSettings, RadiusRegression, TrackPerturbationEngine};
use crate::planner::EnsembleSource;
use crate::region::{RegionPolicy, RegionProfile};
use crate::script::ScriptSettings;
use crate::solver::{GaugeSpec, RegionSpec, WindModel};
use crate::track::Domain;

#[derive(Debug, Deserialize)]
struct ConfigRoot {
    batch: BatchSection,
    #[serde(default)]
    scheduler: SchedulerSection,
    #[serde(default)]
    job: JobSection,
    #[serde(default)]
    region: RegionSection,
    #[serde(default)]
    ensemble: Option<EnsembleSection>,
    #[serde(default)]
    solver: SolverSection,
}

#[derive(Debug, Deserialize)]
struct BatchSection {
    base_path: PathBuf,
    tracks_dir: PathBuf,
    #[serde(default = "default_quota")]
    quota: usize,
    #[serde(default)]
    failure_policy: FailurePolicy,
    #[serde(default)]
    restart: bool,
    #[serde(default)]
    registry: Option<PathBuf>,
}

fn default_quota() -> usize {
    500
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SchedulerSection {
    account: String,
    queue: String,
    wall_time: String,
    email: Option<String>,
    omp_num_threads: Option<usize>,
    submit_command: String,
    run_command: String,
    executable: String,
    build_command: String,
    max_surge_command: Option<String>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let script = ScriptSettings::default();
        SchedulerSection {
            account: script.account,
            queue: script.queue,
            wall_time: script.wall_time,
            email: None,
            omp_num_threads: None,
            submit_command: "sbatch".to_string(),
            run_command: script.run_command,
            executable: script.executable,
            build_command: script.build_command,
            max_surge_command: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct JobSection {
    wind_model: Option<WindModel>,
    wind_models: Vec<WindModel>,
    refinement_level: u32,
    region: Option<String>,
    ensemble_type: String,
}

impl Default for JobSection {
    fn default() -> Self {
        JobSection {
            wind_model: None,
            wind_models: Vec::new(),
            refinement_level: 2,
            region: None,
            ensemble_type: "Synthetic".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegionSection {
    preset: Option<String>,
    gauges: Vec<GaugeSpec>,
    regions: Vec<RegionSpec>,
    domain: Option<DomainSection>,
}

#[derive(Debug, Deserialize)]
struct DomainSection {
    lower: [f64; 2],
    upper: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct EnsembleSection {
    #[serde(default)]
    control_track: Option<PathBuf>,
    #[serde(default)]
    track_dir: Option<PathBuf>,
    #[serde(default = "default_format")]
    format: String,
    #[serde(default = "default_size")]
    size: usize,
    #[serde(default = "default_mean")]
    mean: f64,
    #[serde(default)]
    std_dev: Option<f64>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default = "default_true")]
    piecewise_control: bool,
    #[serde(default)]
    regression: Option<RegressionSection>,
}

fn default_format() -> String {
    "atcf".to_string()
}

fn default_size() -> usize {
    1000
}

fn default_mean() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RegressionSection {
    c0: f64,
    a1: f64,
    b1: f64,
    b2: f64,
    a2: f64,
}

#[derive(Debug, Deserialize)]
struct SolverSection {
    #[serde(default = "default_restart_file")]
    restart_file: String,
    #[serde(flatten)]
    settings: BTreeMap<String, toml::Value>,
}

impl Default for SolverSection {
    fn default() -> Self {
        SolverSection {
            restart_file: default_restart_file(),
            settings: BTreeMap::new(),
        }
    }
}

fn default_restart_file() -> String {
    "fort.chk00006".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackSource {
    /// Perturb `size` members from one control track.
    Control {
        path: PathBuf,
        dialect: TrackDialect,
        size: usize,
        perturbation: PerturbationSettings,
    },
    /// Use every track file in a directory as-is.
    Directory { path: PathBuf, dialect: TrackDialect },
}

impl TrackSource {
    pub fn open(&self) -> Result<EnsembleSource> {
        match self {
            TrackSource::Control {
                path,
                dialect,
                size,
                perturbation,
            } => {
                let control = track_file::read_track(path, *dialect)?;
                let engine = TrackPerturbationEngine::new(perturbation)?;
                Ok(EnsembleSource::synthetic(engine, &control, *size))
            }
            TrackSource::Directory { path, dialect } => Ok(EnsembleSource::Provided(
                track_file::read_track_dir(path, *dialect)?,
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub params: JobParams,
    pub controller: ControllerOptions,
    pub quota: usize,
    pub submit_command: String,
    pub registry: Option<PathBuf>,
    pub source: Option<TrackSource>,
}

pub fn load_from_file(path: &Path) -> Result<BatchConfig> {
    let raw = fs::read_to_string(path).map_err(|e| Error::fs(path, e))?;
    parse(&raw)
}

pub fn parse(raw: &str) -> Result<BatchConfig> {
    let root: ConfigRoot = toml::from_str(raw)
        .map_err(|e| Error::config(format!("failed to parse batch configuration: {e}")))?;
    resolve(root)
}

fn resolve(root: ConfigRoot) -> Result<BatchConfig> {
    let region = resolve_region(&root.job, root.region)?;

    let mut wind_models = root.job.wind_models;
    if let Some(model) = root.job.wind_model {
        if !wind_models.contains(&model) {
            wind_models.insert(0, model);
        }
    }
    if let Some(model) = first_duplicate(&wind_models) {
        return Err(Error::config(format!("wind model {model} is listed twice")));
    }

    let params = JobParams {
        wind_models,
        refinement_level: root.job.refinement_level,
        region,
        ensemble_type: root.job.ensemble_type,
        tracks_dir: root.batch.tracks_dir,
        restart: root.batch.restart,
        restart_file: root.solver.restart_file,
        solver_settings: root
            .solver
            .settings
            .into_iter()
            .map(|(k, v)| (k, setting_value(&v)))
            .collect(),
    };

    let s = root.scheduler;
    let controller = ControllerOptions {
        base_path: root.batch.base_path,
        script: ScriptSettings {
            account: s.account,
            queue: s.queue,
            wall_time: s.wall_time,
            email: s.email,
            omp_num_threads: s.omp_num_threads.unwrap_or_else(num_cpus::get),
            run_command: s.run_command,
            executable: s.executable,
            build_command: s.build_command,
            max_surge_command: s.max_surge_command,
        },
        failure_policy: root.batch.failure_policy,
        show_progress: true,
    };

    let source = root.ensemble.map(resolve_source).transpose()?;

    Ok(BatchConfig {
        params,
        controller,
        quota: root.batch.quota,
        submit_command: s.submit_command,
        registry: root.batch.registry,
        source,
    })
}

/// A preset supplies gauges, regions and domain; explicit entries replace
/// them and `job.region` renames the label. Without a preset or a label the
/// region stays unset.
fn resolve_region(job: &JobSection, section: RegionSection) -> Result<Option<Arc<dyn RegionPolicy>>> {
    let mut profile = match (&section.preset, &job.region) {
        (Some(preset), _) => RegionProfile::preset(preset)?,
        (None, Some(label)) => RegionProfile::new(label.clone()),
        (None, None) => return Ok(None),
    };
    if let Some(label) = &job.region {
        profile.label = label.clone();
    }
    if !section.gauges.is_empty() {
        profile.gauges = section.gauges;
    }
    if !section.regions.is_empty() {
        profile.regions = section.regions;
    }
    if let Some(domain) = section.domain {
        profile.domain = Some(Domain {
            lower: (domain.lower[0], domain.lower[1]),
            upper: (domain.upper[0], domain.upper[1]),
        });
    }
    let region: Arc<dyn RegionPolicy> = Arc::new(profile);
    Ok(Some(region))
}

fn resolve_source(section: EnsembleSection) -> Result<TrackSource> {
    let dialect: TrackDialect = section.format.parse()?;
    match (section.control_track, section.track_dir) {
        (Some(path), None) => {
            let std_dev = section.std_dev.ok_or_else(|| {
                Error::config("ensemble.std_dev is required when perturbing a control track")
            })?;
            let regression = section
                .regression
                .map(|r| RadiusRegression {
                    c0: r.c0,
                    a1: r.a1,
                    b1: r.b1,
                    b2: r.b2,
                    a2: r.a2,
                })
                .unwrap_or_default();
            Ok(TrackSource::Control {
                path,
                dialect,
                size: section.size,
                perturbation: PerturbationSettings {
                    mean: section.mean,
                    std_dev,
                    seed: section.seed,
                    regression,
                    piecewise_control: section.piecewise_control,
                },
            })
        }
        (None, Some(path)) => Ok(TrackSource::Directory { path, dialect }),
        (Some(_), Some(_)) => Err(Error::config(
            "ensemble.control_track and ensemble.track_dir are mutually exclusive",
        )),
        (None, None) => Err(Error::config(
            "ensemble needs either control_track or track_dir",
        )),
    }
}

fn first_duplicate(models: &[WindModel]) -> Option<WindModel> {
    models
        .iter()
        .enumerate()
        .find(|(i, m)| models[..*i].contains(m))
        .map(|(_, m)| *m)
}

fn setting_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Boolean(b) => (if *b { "T" } else { "F" }).to_string(),
        toml::Value::Array(items) => items
            .iter()
            .map(setting_value)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}
