//! Load phases and the built-in presets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A stretch of the run whose request rate moves linearly from
/// `start_rps` to `end_rps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub duration_secs: u64,
    pub start_rps: f64,
    pub end_rps: f64,
}

impl Phase {
    pub fn new(name: impl Into<String>, duration_secs: u64, start_rps: f64, end_rps: f64) -> Self {
        Self {
            name: name.into(),
            duration_secs,
            start_rps,
            end_rps,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Target rate `offset` into the phase.
    pub fn rate_at(&self, offset: Duration) -> f64 {
        if self.duration_secs == 0 {
            return self.end_rps;
        }
        let progress = (offset.as_secs_f64() / self.duration_secs as f64).clamp(0.0, 1.0);
        self.start_rps + (self.end_rps - self.start_rps) * progress
    }

    /// Number of calls the phase issues when run to completion.
    pub fn expected_calls(&self) -> f64 {
        (self.start_rps + self.end_rps) / 2.0 * self.duration_secs as f64
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.duration_secs == 0 {
            return Err(format!("phase {:?} has zero duration", self.name));
        }
        for rate in [self.start_rps, self.end_rps] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(format!("phase {:?} has invalid rate {rate}", self.name));
            }
        }
        Ok(())
    }
}

/// Named load shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// One short ramp to check the pipeline end to end
    #[default]
    Smoke,
    /// Ramp up, hold a sustained load, ramp down
    #[serde(alias = "avg")]
    Average,
    /// Phases listed in the configuration
    Custom,
}

impl Preset {
    /// Phases of a built-in preset; `None` for `Custom`.
    pub fn phases(&self) -> Option<Vec<Phase>> {
        match self {
            Preset::Smoke => Some(vec![Phase::new("increment", 120, 1.0, 200.0)]),
            Preset::Average => Some(vec![
                Phase::new("ramp-up", 5 * 60, 0.0, 200.0),
                Phase::new("sustain", 30 * 60, 200.0, 250.0),
                Phase::new("ramp-down", 5 * 60, 250.0, 0.0),
            ]),
            Preset::Custom => None,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Smoke => write!(f, "smoke"),
            Preset::Average => write!(f, "average"),
            Preset::Custom => write!(f, "custom"),
        }
    }
}

/// Total length of a phase list.
pub fn total_duration(phases: &[Phase]) -> Duration {
    phases.iter().map(Phase::duration).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_interpolation() {
        let phase = Phase::new("ramp", 100, 0.0, 200.0);
        assert_eq!(phase.rate_at(Duration::ZERO), 0.0);
        assert_eq!(phase.rate_at(Duration::from_secs(50)), 100.0);
        assert_eq!(phase.rate_at(Duration::from_secs(100)), 200.0);
        assert_eq!(phase.rate_at(Duration::from_secs(500)), 200.0);

        let down = Phase::new("down", 10, 250.0, 0.0);
        assert_eq!(down.rate_at(Duration::from_secs(5)), 125.0);
        assert_eq!(down.expected_calls(), 1250.0);
    }

    #[test]
    fn test_presets() {
        let smoke = Preset::Smoke.phases().unwrap();
        assert_eq!(smoke.len(), 1);
        assert_eq!(total_duration(&smoke), Duration::from_secs(120));
        assert_eq!((smoke[0].start_rps, smoke[0].end_rps), (1.0, 200.0));

        let average = Preset::Average.phases().unwrap();
        assert_eq!(total_duration(&average), Duration::from_secs(40 * 60));
        assert_eq!(average[1].start_rps, 200.0);
        assert_eq!(average[1].end_rps, 250.0);
        assert_eq!(average[2].end_rps, 0.0);

        assert!(Preset::Custom.phases().is_none());
    }

    #[test]
    fn test_preset_names() {
        let preset: Preset = serde_yaml::from_str("avg").unwrap();
        assert_eq!(preset, Preset::Average);
        assert_eq!(Preset::Average.to_string(), "average");
        assert!(serde_yaml::from_str::<Preset>("spike").is_err());
    }

    #[test]
    fn test_phase_validation() {
        assert!(Phase::new("ok", 10, 0.0, 5.0).validate().is_ok());
        assert!(Phase::new("empty", 0, 1.0, 5.0).validate().is_err());
        assert!(Phase::new("negative", 10, -1.0, 5.0).validate().is_err());
        assert!(Phase::new("nan", 10, f64::NAN, 5.0).validate().is_err());
    }
}
