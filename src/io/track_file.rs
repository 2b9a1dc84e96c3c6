use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::track::{Track, TrackSample};

const KNOTS_TO_MPS: f64 = 0.514444;
const MB_TO_PA: f64 = 100.0;
const NMI_TO_M: f64 = 1852.0;

/// Storm radius written to every GeoClaw row; tracks do not carry one.
pub const DEFAULT_STORM_RADIUS: f64 = 500.0e3;

pub const NORMALIZED_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDialect {
    Atcf,
    Normalized,
}

impl FromStr for TrackDialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "atcf" => Ok(TrackDialect::Atcf),
            "normalized" | "csv" => Ok(TrackDialect::Normalized),
            other => Err(Error::config(format!("unknown track dialect '{other}'"))),
        }
    }
}

pub fn read_track(path: &Path, dialect: TrackDialect) -> Result<Track> {
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "track".to_string());
    let file = File::open(path).map_err(|e| Error::fs(path, e))?;
    let reader = BufReader::new(file);

    let samples = match dialect {
        TrackDialect::Atcf => read_atcf_samples(path, reader)?,
        TrackDialect::Normalized => read_normalized_samples(path, reader)?,
    };
    debug!(path = %path.display(), samples = samples.len(), "read track");

    Track::from_samples(id, &samples).map_err(|message| Error::track(path, 0, message))
}

pub fn read_track_dir(dir: &Path, dialect: TrackDialect) -> Result<Vec<Track>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| Error::fs(dir, e))? {
        let path = entry.map_err(|e| Error::fs(dir, e))?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut ids = HashSet::new();
    let mut tracks = Vec::with_capacity(paths.len());
    for path in &paths {
        let track = read_track(path, dialect)?;
        if !ids.insert(track.id.clone()) {
            return Err(Error::config(format!(
                "track id '{}' appears twice in {}",
                track.id,
                dir.display()
            )));
        }
        tracks.push(track);
    }
    Ok(tracks)
}

fn field<'r>(record: &'r StringRecord, index: usize) -> Option<&'r str> {
    record.get(index).map(str::trim).filter(|s| !s.is_empty())
}

/// Parse "200N" / "725W" style tenths-of-degree coordinates.
fn parse_coordinate(raw: &str) -> Option<f64> {
    if !raw.is_ascii() {
        return None;
    }
    let (digits, hemisphere) = raw.split_at(raw.len().checked_sub(1)?);
    let value = digits.trim().parse::<f64>().ok()? / 10.0;
    match hemisphere {
        "N" | "E" => Some(value),
        "S" | "W" => Some(-value),
        _ => None,
    }
}

fn read_atcf_samples<R: std::io::Read>(path: &Path, reader: R) -> Result<Vec<TrackSample>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut samples: Vec<TrackSample> = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let line = line + 1;
        let record = result?;
        if record.len() < 10 {
            return Err(Error::track(path, line, "ATCF record has fewer than 10 fields"));
        }

        let date = field(&record, 2).ok_or_else(|| Error::track(path, line, "missing date"))?;
        let base = NaiveDateTime::parse_from_str(&format!("{date}00"), "%Y%m%d%H%M")
            .map_err(|e| Error::track(path, line, format!("bad date '{date}': {e}")))?;
        let tau = field(&record, 5)
            .map(|s| s.parse::<i64>())
            .transpose()
            .map_err(|e| Error::track(path, line, format!("bad forecast hour: {e}")))?
            .unwrap_or(0);
        let timestamp = base + Duration::hours(tau);

        // Records repeat per wind-radii threshold; keep the first.
        if samples.last().is_some_and(|s| s.timestamp == timestamp) {
            continue;
        }

        let latitude = field(&record, 6)
            .and_then(parse_coordinate)
            .ok_or_else(|| Error::track(path, line, "bad latitude"))?;
        let longitude = field(&record, 7)
            .and_then(parse_coordinate)
            .ok_or_else(|| Error::track(path, line, "bad longitude"))?;
        let number = |index: usize, name: &str| -> Result<f64> {
            field(&record, index)
                .map(|s| s.parse::<f64>())
                .transpose()
                .map_err(|e| Error::track(path, line, format!("bad {name}: {e}")))
                .map(|v| v.unwrap_or(0.0))
        };

        samples.push(TrackSample {
            timestamp,
            eye_longitude: longitude,
            eye_latitude: latitude,
            max_wind_speed: number(8, "max wind speed")? * KNOTS_TO_MPS,
            central_pressure: number(9, "central pressure")? * MB_TO_PA,
            max_wind_radius: number(19, "radius of max winds")? * NMI_TO_M,
        });
    }
    Ok(samples)
}

#[derive(Debug, Deserialize)]
struct NormalizedRow {
    timestamp: String,
    eye_longitude: f64,
    eye_latitude: f64,
    max_wind_speed: f64,
    max_wind_radius: f64,
    central_pressure: f64,
}

fn read_normalized_samples<R: std::io::Read>(path: &Path, reader: R) -> Result<Vec<TrackSample>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut samples = Vec::new();
    for (line, result) in rdr.deserialize::<NormalizedRow>().enumerate() {
        let line = line + 2;
        let row = result?;
        let timestamp = NaiveDateTime::parse_from_str(&row.timestamp, NORMALIZED_TIME_FORMAT)
            .map_err(|e| Error::track(path, line, format!("bad timestamp '{}': {e}", row.timestamp)))?;
        samples.push(TrackSample {
            timestamp,
            eye_longitude: row.eye_longitude,
            eye_latitude: row.eye_latitude,
            max_wind_speed: row.max_wind_speed,
            max_wind_radius: row.max_wind_radius,
            central_pressure: row.central_pressure,
        });
    }
    Ok(samples)
}

/// Write `track` in the GeoClaw storm dialect: sample count, time offset,
/// a blank line, then one row per sample with time in seconds relative to
/// `time_offset`.
pub fn write_geoclaw(path: &Path, track: &Track, time_offset: NaiveDateTime) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::fs(path, e))?;
    let mut out = BufWriter::new(file);

    let write_all = |out: &mut BufWriter<File>| -> std::io::Result<()> {
        writeln!(out, "{}", track.len())?;
        writeln!(out, "{}", time_offset.format(NORMALIZED_TIME_FORMAT))?;
        writeln!(out)?;
        for i in 0..track.len() {
            let t = (track.timestamps[i] - time_offset).num_seconds() as f64;
            writeln!(
                out,
                "{:20.10e} {:20.10e} {:20.10e} {:20.10e} {:20.10e} {:20.10e} {:20.10e}",
                t,
                track.eye_longitude[i],
                track.eye_latitude[i],
                track.max_wind_speed[i],
                track.max_wind_radius[i],
                track.central_pressure[i],
                DEFAULT_STORM_RADIUS,
            )?;
        }
        out.flush()
    };

    write_all(&mut out).map_err(|e| Error::fs(path, e))
}

pub fn write_normalized(path: &Path, track: &Track) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "timestamp",
        "eye_longitude",
        "eye_latitude",
        "max_wind_speed",
        "max_wind_radius",
        "central_pressure",
    ])?;
    for i in 0..track.len() {
        wtr.write_record(&[
            track.timestamps[i].format(NORMALIZED_TIME_FORMAT).to_string(),
            track.eye_longitude[i].to_string(),
            track.eye_latitude[i].to_string(),
            track.max_wind_speed[i].to_string(),
            track.max_wind_radius[i].to_string(),
            track.central_pressure[i].to_string(),
        ])?;
    }
    wtr.flush().map_err(|e| Error::fs(path, e))
}
