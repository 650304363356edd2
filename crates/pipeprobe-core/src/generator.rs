//! Value generators for variable message fields.

use crate::error::{CoreError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{SecondsFormat, Utc};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;
use uuid::Uuid;

/// Layout name selecting RFC3339 output instead of a strftime pattern.
pub const RFC3339_LAYOUT: &str = "rfc3339";

fn default_layout() -> String {
    RFC3339_LAYOUT.to_string()
}

/// Produces one value per call for a variable field.
///
/// Generators hold only their construction parameters, so a single instance
/// can be shared by any number of concurrent callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    /// `base ± uniform(0, amp)`, sign picked 50/50 on every call.
    Numeric { base: f64, amp: f64 },
    /// Current UTC time rendered with a strftime layout (or `rfc3339`).
    Timestamp {
        #[serde(default = "default_layout")]
        format: String,
    },
    /// `prefix` followed by a fresh UUID v4.
    Identifier {
        #[serde(default)]
        prefix: String,
    },
}

impl Generator {
    pub fn numeric(base: f64, amp: f64) -> Self {
        Generator::Numeric { base, amp }
    }

    pub fn timestamp(format: impl Into<String>) -> Self {
        Generator::Timestamp {
            format: format.into(),
        }
    }

    pub fn identifier() -> Self {
        Generator::Identifier {
            prefix: String::new(),
        }
    }

    /// Checks parameters that would otherwise make `generate` misbehave.
    pub fn validate(&self) -> Result<()> {
        match self {
            Generator::Numeric { base, amp } => {
                if !base.is_finite() {
                    return Err(CoreError::InvalidGenerator(format!(
                        "numeric base must be finite, got {base}"
                    )));
                }
                if !amp.is_finite() || *amp < 0.0 {
                    return Err(CoreError::InvalidGenerator(format!(
                        "numeric amp must be finite and non-negative, got {amp}"
                    )));
                }
                Ok(())
            }
            Generator::Timestamp { format } => {
                if format.eq_ignore_ascii_case(RFC3339_LAYOUT) {
                    return Ok(());
                }
                if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                    return Err(CoreError::InvalidGenerator(format!(
                        "invalid timestamp layout {format:?}"
                    )));
                }
                Ok(())
            }
            Generator::Identifier { .. } => Ok(()),
        }
    }

    /// Produces the next value.
    pub fn generate(&self) -> Value {
        match self {
            Generator::Numeric { base, amp } => Value::from(numeric_sample(*base, *amp)),
            Generator::Timestamp { format } => {
                let now = Utc::now();
                let rfc3339 = || now.to_rfc3339_opts(SecondsFormat::Secs, true);
                if format.eq_ignore_ascii_case(RFC3339_LAYOUT) {
                    return Value::String(rfc3339());
                }
                // Layouts that fail to render fall back to RFC3339.
                let mut out = String::new();
                match write!(out, "{}", now.format(format)) {
                    Ok(()) => Value::String(out),
                    Err(_) => Value::String(rfc3339()),
                }
            }
            Generator::Identifier { prefix } => {
                Value::String(format!("{}{}", prefix, Uuid::new_v4()))
            }
        }
    }
}

fn numeric_sample(base: f64, amp: f64) -> f64 {
    let mut rng = rand::thread_rng();
    let offset = rng.gen::<f64>() * amp;
    if rng.gen_bool(0.5) {
        base - offset
    } else {
        base + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_numeric_stays_within_amplitude() {
        let gen = Generator::numeric(1000.0, 100.0);
        let samples: Vec<f64> = (0..10_000)
            .map(|_| gen.generate().as_f64().unwrap())
            .collect();

        assert!(samples.iter().all(|v| (900.0..=1100.0).contains(v)));
        assert!(samples.iter().any(|v| *v != samples[0]));
        // Independent draws land on both sides of the base.
        assert!(samples.iter().any(|v| *v < 1000.0));
        assert!(samples.iter().any(|v| *v > 1000.0));
    }

    #[test]
    fn test_numeric_zero_amplitude_is_constant() {
        let gen = Generator::numeric(42.0, 0.0);
        for _ in 0..100 {
            assert_eq!(gen.generate().as_f64(), Some(42.0));
        }
    }

    #[test]
    fn test_timestamp_rfc3339() {
        let value = Generator::timestamp(RFC3339_LAYOUT).generate();
        let s = value.as_str().unwrap();
        assert!(s.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(s).is_ok());
    }

    #[test]
    fn test_timestamp_custom_layout() {
        let value = Generator::timestamp("%Y-%m-%d").generate();
        let s = value.as_str().unwrap();
        assert_eq!(s.len(), 10);
        assert_eq!(&s[4..5], "-");
    }

    #[test]
    fn test_identifier_is_unique_and_prefixed() {
        let gen = Generator::Identifier {
            prefix: "dev-".to_string(),
        };
        let a = gen.generate();
        let b = gen.generate();
        assert_ne!(a, b);
        assert!(a.as_str().unwrap().starts_with("dev-"));
        assert!(Uuid::parse_str(&a.as_str().unwrap()[4..]).is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(Generator::numeric(1.0, 2.0).validate().is_ok());
        assert!(Generator::numeric(1.0, -2.0).validate().is_err());
        assert!(Generator::numeric(f64::NAN, 2.0).validate().is_err());
        assert!(Generator::timestamp("%Y-%m-%dT%H:%M:%S").validate().is_ok());
        assert!(Generator::timestamp("%Q").validate().is_err());
        assert!(Generator::identifier().validate().is_ok());
    }

    #[test]
    fn test_deserialize_tagged() {
        let gen: Generator =
            serde_json::from_str(r#"{"numeric": {"base": 10, "amp": 1}}"#).unwrap();
        assert_eq!(gen, Generator::numeric(10.0, 1.0));

        let gen: Generator = serde_json::from_str(r#"{"timestamp": {}}"#).unwrap();
        assert_eq!(gen, Generator::timestamp(RFC3339_LAYOUT));

        let unknown = serde_json::from_str::<Generator>(r#"{"gaussian": {"mean": 1}}"#);
        assert!(unknown.is_err());
    }
}
