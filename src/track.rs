use chrono::{Duration, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSample {
    pub timestamp: NaiveDateTime,
    pub eye_longitude: f64,
    pub eye_latitude: f64,
    pub max_wind_speed: f64,
    pub max_wind_radius: f64,
    pub central_pressure: f64,
}

/// A storm track stored column-wise. Every per-sample vector has the same
/// length and `timestamps` is strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub timestamps: Vec<NaiveDateTime>,
    pub eye_longitude: Vec<f64>,
    pub eye_latitude: Vec<f64>,
    pub max_wind_speed: Vec<f64>,
    pub max_wind_radius: Vec<f64>,
    pub central_pressure: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain {
    pub lower: (f64, f64),
    pub upper: (f64, f64),
}

impl Domain {
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        longitude >= self.lower.0
            && longitude <= self.upper.0
            && latitude >= self.lower.1
            && latitude <= self.upper.1
    }
}

impl Track {
    pub fn from_samples(
        id: impl Into<String>,
        samples: &[TrackSample],
    ) -> Result<Self, String> {
        let track = Track {
            id: id.into(),
            timestamps: samples.iter().map(|s| s.timestamp).collect(),
            eye_longitude: samples.iter().map(|s| s.eye_longitude).collect(),
            eye_latitude: samples.iter().map(|s| s.eye_latitude).collect(),
            max_wind_speed: samples.iter().map(|s| s.max_wind_speed).collect(),
            max_wind_radius: samples.iter().map(|s| s.max_wind_radius).collect(),
            central_pressure: samples.iter().map(|s| s.central_pressure).collect(),
        };
        track.validate()?;
        Ok(track)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        let n = self.timestamps.len();
        let columns = [
            ("eye_longitude", self.eye_longitude.len()),
            ("eye_latitude", self.eye_latitude.len()),
            ("max_wind_speed", self.max_wind_speed.len()),
            ("max_wind_radius", self.max_wind_radius.len()),
            ("central_pressure", self.central_pressure.len()),
        ];
        for (name, len) in columns {
            if len != n {
                return Err(format!(
                    "track {}: {} has {} samples, expected {}",
                    self.id, name, len, n
                ));
            }
        }

        if let Some(i) = self.timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(format!(
                "track {}: timestamp {} at sample {} does not follow {}",
                self.id,
                self.timestamps[i + 1],
                i + 1,
                self.timestamps[i]
            ));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => *last - *first,
            _ => Duration::zero(),
        }
    }

    /// Copy of this track under a new key with replaced wind fields. Eye
    /// locations, timestamps and pressure are shared with `self`.
    pub fn with_wind_fields(
        &self,
        id: impl Into<String>,
        max_wind_speed: Vec<f64>,
        max_wind_radius: Vec<f64>,
    ) -> Track {
        Track {
            id: id.into(),
            timestamps: self.timestamps.clone(),
            eye_longitude: self.eye_longitude.clone(),
            eye_latitude: self.eye_latitude.clone(),
            max_wind_speed,
            max_wind_radius,
            central_pressure: self.central_pressure.clone(),
        }
    }

    pub fn first_entry(&self, domain: &Domain) -> Option<NaiveDateTime> {
        (0..self.len())
            .find(|&i| domain.contains(self.eye_longitude[i], self.eye_latitude[i]))
            .map(|i| self.timestamps[i])
    }
}
