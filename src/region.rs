use std::fmt;

use crate::error::{Error, Result};
use crate::solver::{GaugeSpec, RegionSpec};
use crate::track::Domain;

/// Region-specific inputs to a job: its naming label, gauge locations,
/// refinement boxes and the domain used to offset track time.
pub trait RegionPolicy: fmt::Debug {
    fn label(&self) -> &str;

    fn gauges(&self) -> &[GaugeSpec] {
        &[]
    }

    fn regions(&self) -> &[RegionSpec] {
        &[]
    }

    fn domain(&self) -> Option<Domain> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionProfile {
    pub label: String,
    pub gauges: Vec<GaugeSpec>,
    pub regions: Vec<RegionSpec>,
    pub domain: Option<Domain>,
}

impl RegionProfile {
    pub fn new(label: impl Into<String>) -> Self {
        RegionProfile {
            label: label.into(),
            gauges: Vec::new(),
            regions: Vec::new(),
            domain: None,
        }
    }

    pub fn square_basin() -> Self {
        RegionProfile::new("SquareBasin")
    }

    pub fn mumbai() -> Self {
        RegionProfile {
            label: "Mumbai".to_string(),
            gauges: vec![
                GaugeSpec { x: 72.811790, y: 18.936508 },
                GaugeSpec { x: 72.972316, y: 18.997762 },
                GaugeSpec { x: 72.819311, y: 18.818044 },
                GaugeSpec { x: 72.50, y: 18.50 },
            ],
            regions: vec![
                RegionSpec {
                    level_min: 2,
                    level_max: 5,
                    x0: 70.0,
                    x1: 75.0,
                    y0: 17.0,
                    y1: 22.0,
                    start_time: None,
                },
                RegionSpec {
                    level_min: 4,
                    level_max: 7,
                    x0: 72.6,
                    x1: 73.0,
                    y0: 18.80,
                    y1: 19.15,
                    start_time: Some(crate::solver::days_to_seconds(1.0)),
                },
            ],
            domain: Some(Domain {
                lower: (70.0, 17.0),
                upper: (75.0, 22.0),
            }),
        }
    }

    pub fn preset(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "square-basin" | "squarebasin" => Ok(RegionProfile::square_basin()),
            "mumbai" => Ok(RegionProfile::mumbai()),
            other => Err(Error::config(format!("unknown region preset '{other}'"))),
        }
    }
}

impl RegionPolicy for RegionProfile {
    fn label(&self) -> &str {
        &self.label
    }

    fn gauges(&self) -> &[GaugeSpec] {
        &self.gauges
    }

    fn regions(&self) -> &[RegionSpec] {
        &self.regions
    }

    fn domain(&self) -> Option<Domain> {
        self.domain
    }
}
