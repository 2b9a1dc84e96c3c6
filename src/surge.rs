//! Maximum-surge extraction from solver gauge output.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};

/// Column of the surface elevation in a gauge row:
/// `level, t, h, hu, hv, eta, ...`.
const ETA_COLUMN: usize = 5;

pub fn gauge_path(output_dir: &Path, gauge_id: u32) -> PathBuf {
    output_dir.join(format!("gauge{:05}.txt", gauge_id))
}

/// `<base>/MaxSurge/<job_name>/<prefix>_gaugeMaxSurge.txt`
pub fn max_surge_path(base_path: &Path, job_name: &str, prefix: &str) -> PathBuf {
    base_path
        .join("MaxSurge")
        .join(job_name)
        .join(format!("{}_gaugeMaxSurge.txt", prefix))
}

pub fn read_max_surge(path: &Path) -> Result<f64> {
    let content = fs::read_to_string(path).map_err(|e| Error::fs(path, e))?;
    let mut max: Option<f64> = None;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let eta = line
            .split_whitespace()
            .nth(ETA_COLUMN)
            .ok_or_else(|| Error::track(path, i + 1, "gauge row has no surface column"))?
            .parse::<f64>()
            .map_err(|e| Error::track(path, i + 1, format!("bad surface value: {e}")))?;
        max = Some(max.map_or(eta, |m| m.max(eta)));
    }

    max.ok_or_else(|| Error::track(path, 0, "gauge file has no samples"))
}

pub fn extract(output_dir: &Path, gauge_count: u32) -> Result<Vec<(u32, f64)>> {
    (1..=gauge_count)
        .map(|id| Ok((id, read_max_surge(&gauge_path(output_dir, id))?)))
        .collect()
}

pub fn write_max_surge(path: &Path, surges: &[(u32, f64)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
    }
    let mut out = String::from("Gauge, Surge \n");
    for (gauge, surge) in surges {
        out.push_str(&format!("{}, {:.6} \n", gauge, surge));
    }
    fs::write(path, out).map_err(|e| Error::fs(path, e))?;
    info!(path = %path.display(), gauges = surges.len(), "wrote max surge");
    Ok(())
}
