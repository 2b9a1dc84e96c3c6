use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::error::{Error, Result};
use crate::track::Track;

pub const DEG_TO_RAD: f64 = 0.0174533;

/// Empirical fit of radius of maximum winds against wind speed and latitude:
/// `c0 - a1*W + (W/b1)^2 - (W/b2)^3 - a2*cos(lat)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusRegression {
    pub c0: f64,
    pub a1: f64,
    pub b1: f64,
    pub b2: f64,
    pub a2: f64,
}

impl Default for RadiusRegression {
    fn default() -> Self {
        RadiusRegression {
            c0: 218.3784,
            a1: 1.2014,
            b1: 10.9884,
            b2: 35.3052,
            a2: 145.5090,
        }
    }
}

impl RadiusRegression {
    pub fn radius(&self, wind_speed: f64, latitude_deg: f64) -> f64 {
        self.c0 - self.a1 * wind_speed + (wind_speed / self.b1).powi(2)
            - (wind_speed / self.b2).powi(3)
            - self.a2 * (latitude_deg * DEG_TO_RAD).cos()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerturbationSettings {
    pub mean: f64,
    pub std_dev: f64,
    pub seed: Option<u64>,
    pub regression: RadiusRegression,
    pub piecewise_control: bool,
}

impl PerturbationSettings {
    pub fn new(std_dev: f64) -> Self {
        PerturbationSettings {
            mean: 1.0,
            std_dev,
            seed: None,
            regression: RadiusRegression::default(),
            piecewise_control: true,
        }
    }
}

/// Ramp up from `u0` by one unit per sample through the midpoint index
/// `(N-1)/2`, then down by one unit per sample. The midpoint sample belongs to
/// the ascending branch.
pub fn generate_piecewise_profile<T: PartialOrd>(u0: f64, timestamps: &[T]) -> Vec<f64> {
    let n = timestamps.len();
    if n == 0 {
        return Vec::new();
    }
    let max_index = (n - 1) / 2;

    let mut profile = Vec::with_capacity(n);
    profile.push(u0);
    for i in 1..n {
        let previous = profile[i - 1];
        if timestamps[i] <= timestamps[max_index] {
            profile.push(previous + 1.0);
        } else {
            profile.push(previous - 1.0);
        }
    }
    profile
}

pub fn member_name(index: usize) -> String {
    format!("synthetic_{}", index)
}

pub struct TrackPerturbationEngine {
    distribution: Normal<f64>,
    rng: StdRng,
    regression: RadiusRegression,
    piecewise_control: bool,
}

impl TrackPerturbationEngine {
    pub fn new(settings: &PerturbationSettings) -> Result<Self> {
        if !settings.std_dev.is_finite() || settings.std_dev <= 0.0 {
            return Err(Error::config(format!(
                "perturbation std_dev must be positive and finite, got {}",
                settings.std_dev
            )));
        }
        let distribution = Normal::new(settings.mean, settings.std_dev)
            .map_err(|e| Error::config(format!("invalid perturbation distribution: {e}")))?;
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(TrackPerturbationEngine {
            distribution,
            rng,
            regression: settings.regression,
            piecewise_control: settings.piecewise_control,
        })
    }

    pub fn perturb(&mut self, wind_speed: &[f64]) -> Vec<f64> {
        wind_speed
            .iter()
            .map(|w| w + self.distribution.sample(&mut self.rng))
            .collect()
    }

    pub fn derive_radius(&self, wind_speed: &[f64], eye_latitude: &[f64]) -> Vec<f64> {
        wind_speed
            .iter()
            .zip(eye_latitude)
            .map(|(&w, &lat)| self.regression.radius(w, lat))
            .collect()
    }

    /// The control as it is fed to the perturbation loop: with the piecewise
    /// ramp applied when configured. The ramp starts from the second sample's
    /// wind speed, or the first when the track has a single sample.
    pub fn prepare_control(&self, control: &Track) -> Track {
        if !self.piecewise_control || control.is_empty() {
            return control.clone();
        }
        let u0 = control
            .max_wind_speed
            .get(1)
            .or_else(|| control.max_wind_speed.first())
            .copied()
            .unwrap_or_default();
        let profile = generate_piecewise_profile(u0, &control.timestamps);
        control.with_wind_fields(
            control.id.clone(),
            profile,
            control.max_wind_radius.clone(),
        )
    }

    pub fn perturbed_member(&mut self, control: &Track, id: impl Into<String>) -> Track {
        let wind = self.perturb(&control.max_wind_speed);
        let radius = self.derive_radius(&wind, &control.eye_latitude);
        control.with_wind_fields(id, wind, radius)
    }

    pub fn generate(&mut self, control: &Track, first_index: usize, count: usize) -> Vec<Track> {
        debug!(
            control = %control.id,
            first_index,
            count,
            "generating perturbed members"
        );
        (first_index..first_index + count)
            .map(|index| self.perturbed_member(control, member_name(index)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::hourly_track;

    fn engine(seed: u64) -> TrackPerturbationEngine {
        let mut settings = PerturbationSettings::new(1.0);
        settings.seed = Some(seed);
        TrackPerturbationEngine::new(&settings).unwrap()
    }

    #[test]
    fn five_sample_profile_peaks_at_midpoint() {
        let track = hourly_track("control", &[35.0, 40.0, 45.0, 50.0, 55.0]);
        let profile = generate_piecewise_profile(track.max_wind_speed[1], &track.timestamps);
        assert_eq!(profile, vec![40.0, 41.0, 42.0, 41.0, 40.0]);
    }

    #[test]
    fn profile_is_monotone_on_each_side_of_midpoint() {
        for n in 0..40usize {
            let times: Vec<f64> = (0..n).map(|i| i as f64 * 3.0).collect();
            let profile = generate_piecewise_profile(10.0, &times);
            assert_eq!(profile.len(), n);
            if n == 0 {
                continue;
            }
            let mid = (n - 1) / 2;
            for i in 1..n {
                if i <= mid {
                    assert!(profile[i] >= profile[i - 1], "n={n} i={i}");
                } else {
                    assert!(profile[i] <= profile[i - 1], "n={n} i={i}");
                }
            }
        }
    }

    #[test]
    fn radius_matches_regression_constants() {
        let engine = engine(1);
        let radius = engine.derive_radius(&[50.0], &[0.0]);
        let expected = 218.3784 - 1.2014 * 50.0 + (50.0f64 / 10.9884).powi(2)
            - (50.0f64 / 35.3052).powi(3)
            - 145.5090;
        assert_eq!(radius, vec![expected]);
    }

    #[test]
    fn derive_radius_is_bit_reproducible() {
        let a = engine(1);
        let b = engine(99);
        let wind = [30.5, 41.25, 60.0, 12.0];
        let lat = [10.0, 22.5, 35.0, -15.0];
        let ra = a.derive_radius(&wind, &lat);
        let rb = b.derive_radius(&wind, &lat);
        assert!(
            ra.iter()
                .zip(&rb)
                .all(|(x, y)| x.to_bits() == y.to_bits())
        );
        assert!(a.derive_radius(&[], &[]).is_empty());
    }

    #[test]
    fn seeded_perturbation_is_reproducible() {
        let wind = vec![40.0; 16];
        let first = engine(7).perturb(&wind);
        let second = engine(7).perturb(&wind);
        assert_eq!(first, second);
        assert_ne!(first, engine(8).perturb(&wind));
    }

    #[test]
    fn perturbation_centres_on_mean_shift() {
        let wind = vec![0.0; 20_000];
        let shifted = engine(3).perturb(&wind);
        let mean = shifted.iter().sum::<f64>() / shifted.len() as f64;
        assert!((mean - 1.0).abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn chunked_generation_matches_single_pass() {
        let control = hourly_track("control", &[30.0, 35.0, 40.0]);
        let whole = engine(11).generate(&control, 0, 6);

        let mut chunked_engine = engine(11);
        let mut chunked = chunked_engine.generate(&control, 0, 4);
        chunked.extend(chunked_engine.generate(&control, 4, 2));

        assert_eq!(whole, chunked);
        assert_eq!(whole[5].id, "synthetic_5");
        assert_eq!(whole[5].timestamps, control.timestamps);
        assert_eq!(whole[5].eye_latitude, control.eye_latitude);
    }

    #[test]
    fn rejects_non_positive_std_dev() {
        assert!(TrackPerturbationEngine::new(&PerturbationSettings::new(0.0)).is_err());
        assert!(TrackPerturbationEngine::new(&PerturbationSettings::new(f64::NAN)).is_err());
    }
}
