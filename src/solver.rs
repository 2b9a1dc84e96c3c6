//! Typed solver configuration and its serialization into `*.data` files.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::workdir::WorkingContext;

pub const SECONDS_PER_DAY: f64 = 86400.0;

pub fn days_to_seconds(days: f64) -> f64 {
    days * SECONDS_PER_DAY
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum WindModel {
    Holland80,
    Holland10,
    Slosh,
    Rankine,
    Cle,
    ModifiedRankine,
    DeMaria,
}

impl WindModel {
    pub const ALL: [WindModel; 7] = [
        WindModel::Holland80,
        WindModel::Holland10,
        WindModel::Slosh,
        WindModel::Rankine,
        WindModel::Cle,
        WindModel::ModifiedRankine,
        WindModel::DeMaria,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WindModel::Holland80 => "holland80",
            WindModel::Holland10 => "holland10",
            WindModel::Slosh => "SLOSH",
            WindModel::Rankine => "rankine",
            WindModel::Cle => "CLE",
            WindModel::ModifiedRankine => "modified-rankine",
            WindModel::DeMaria => "DeMaria",
        }
    }

    pub fn specification_code(&self) -> u8 {
        match self {
            WindModel::Holland80 => 1,
            WindModel::Holland10 => 2,
            WindModel::Cle => 3,
            WindModel::Slosh => 4,
            WindModel::Rankine => 5,
            WindModel::ModifiedRankine => 6,
            WindModel::DeMaria => 7,
        }
    }
}

impl fmt::Display for WindModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WindModel::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::config(format!("unknown wind model '{s}'")))
    }
}

impl TryFrom<String> for WindModel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GaugeSpec {
    pub x: f64,
    pub y: f64,
}

/// Refinement box as configured. `start_time` defaults to the run's `t0`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RegionSpec {
    pub level_min: u32,
    pub level_max: u32,
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
    #[serde(default)]
    pub start_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gauge {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub t1: f64,
    pub t2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinementRegion {
    pub level_min: u32,
    pub level_max: u32,
    pub t1: f64,
    pub t2: f64,
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
}

#[derive(Debug, Clone)]
pub struct SolverInputs<'a> {
    pub wind_model: WindModel,
    pub refinement_level: u32,
    pub storm_file: PathBuf,
    pub tfinal: f64,
    pub restart: bool,
    pub restart_file: &'a str,
    pub gauges: &'a [GaugeSpec],
    pub regions: &'a [RegionSpec],
    pub settings: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    pub storm_file: PathBuf,
    pub storm_specification_type: WindModel,
    pub amr_levels_max: u32,
    pub t0: f64,
    pub tfinal: f64,
    pub restart: bool,
    pub restart_file: String,
    pub gauges: Vec<Gauge>,
    pub regions: Vec<RefinementRegion>,
    pub aux_out_fields: Vec<u32>,
    /// Solver settings this crate does not interpret, written verbatim.
    pub settings: BTreeMap<String, String>,
}

impl SolverConfig {
    pub fn build(inputs: &SolverInputs<'_>) -> SolverConfig {
        let t0 = days_to_seconds(0.0);
        let tfinal = inputs.tfinal;

        let gauges = inputs
            .gauges
            .iter()
            .enumerate()
            .map(|(i, g)| Gauge {
                id: i as u32 + 1,
                x: g.x,
                y: g.y,
                t1: t0,
                t2: tfinal,
            })
            .collect();

        let regions = inputs
            .regions
            .iter()
            .map(|r| RefinementRegion {
                level_min: r.level_min,
                level_max: r.level_max,
                t1: r.start_time.unwrap_or(t0),
                t2: tfinal,
                x0: r.x0,
                x1: r.x1,
                y0: r.y0,
                y1: r.y1,
            })
            .collect();

        SolverConfig {
            storm_file: inputs.storm_file.clone(),
            storm_specification_type: inputs.wind_model,
            amr_levels_max: inputs.refinement_level,
            t0,
            tfinal,
            restart: inputs.restart,
            restart_file: inputs.restart_file.to_string(),
            gauges,
            regions,
            aux_out_fields: vec![4, 5, 6],
            settings: inputs.settings.clone(),
        }
    }

    pub fn write(&self, ctx: &mut WorkingContext) -> Result<()> {
        let mut claw = DataFile::new();
        claw.entry("t0", self.t0)
            .entry("tfinal", self.tfinal)
            .entry("restart", fortran_bool(self.restart))
            .entry("restart_file", &self.restart_file);
        ctx.write_file("claw.data", claw.as_str())?;

        let mut amr = DataFile::new();
        amr.entry("amr_levels_max", self.amr_levels_max);
        ctx.write_file("amr.data", amr.as_str())?;

        let mut surge = DataFile::new();
        surge
            .entry(
                "storm_specification_type",
                self.storm_specification_type.specification_code(),
            )
            .entry("storm_file", self.storm_file.display());
        ctx.write_file("surge.data", surge.as_str())?;

        let mut gauges = DataFile::new();
        gauges.entry("num_gauges", self.gauges.len());
        for g in &self.gauges {
            gauges.row(format_args!(
                "{:4} {:19.10e} {:19.10e} {:13.6e} {:13.6e}",
                g.id, g.x, g.y, g.t1, g.t2
            ));
        }
        let aux: Vec<String> = self.aux_out_fields.iter().map(u32::to_string).collect();
        gauges.entry("aux_out_fields", aux.join(" "));
        ctx.write_file("gauges.data", gauges.as_str())?;

        let mut regions = DataFile::new();
        regions.entry("num_regions", self.regions.len());
        for r in &self.regions {
            regions.row(format_args!(
                "{:2} {:2} {:13.6e} {:13.6e} {:13.6e} {:13.6e} {:13.6e} {:13.6e}",
                r.level_min, r.level_max, r.t1, r.t2, r.x0, r.x1, r.y0, r.y1
            ));
        }
        ctx.write_file("regions.data", regions.as_str())?;

        let mut settings = DataFile::new();
        for (key, value) in &self.settings {
            settings.entry(key, value);
        }
        ctx.write_file("settings.data", settings.as_str())?;

        Ok(())
    }
}

fn fortran_bool(value: bool) -> &'static str {
    if value { "T" } else { "F" }
}

struct DataFile {
    buf: String,
}

impl DataFile {
    fn new() -> Self {
        DataFile {
            buf: String::from("# generated by surge_rs; edit the batch configuration instead\n\n"),
        }
    }

    fn entry(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
        let _ = writeln!(self.buf, "{:<20} =: {}", value.to_string(), key);
        self
    }

    fn row(&mut self, args: fmt::Arguments<'_>) -> &mut Self {
        let _ = writeln!(self.buf, "{}", args);
        self
    }

    fn as_str(&self) -> &str {
        &self.buf
    }
}
