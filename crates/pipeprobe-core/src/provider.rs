//! Built-in step-count telemetry.

use crate::error::Result;
use crate::message::{BatchInfo, Cumulative, DeviceInfo, Measurements, Message};
use crate::supplier::MessageSupplier;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::prelude::*;
use uuid::Uuid;

const PLATFORM: &str = "iOS";
const AUTHORIZATION_TOKEN: &str = "testToken";
const SOURCE_NAME: &str = "Test iPhone";
const DEVICE_PREFIX: &str = "test-device-";
const STEPS: &str = "STEPS";
const COUNT: &str = "COUNT";

/// Length of the collection window ending at generation time.
pub const COLLECTION_WINDOW_MINUTES: i64 = 15;

/// Produces a plausible wearable batch for a fresh device on every call.
#[derive(Debug, Clone)]
pub struct TelemetryProvider {
    max_size: usize,
}

impl TelemetryProvider {
    /// `max_size` is the approximate encoded size of one message in bytes.
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn generate_at(&self, end: DateTime<Utc>) -> Message {
        let start = end - Duration::minutes(COLLECTION_WINDOW_MINUTES);
        let cumulative = cumulative_samples(start, end, self.max_size / 3);

        Message {
            device_info: DeviceInfo {
                platform: PLATFORM.to_string(),
                device_id: format!("{DEVICE_PREFIX}{}", Uuid::new_v4()),
                authorization_token: AUTHORIZATION_TOKEN.to_string(),
            },
            batch_info: BatchInfo {
                collection_start: rfc3339(start),
                collection_end: rfc3339(end),
            },
            measurements: Measurements {
                instantaneous: Vec::new(),
                cumulative,
                duration: Vec::new(),
            },
            source_name: SOURCE_NAME.to_string(),
            total_steps_today: None,
            timestamp: rfc3339(end),
            ..Default::default()
        }
    }
}

impl MessageSupplier for TelemetryProvider {
    fn get_data(&self) -> Result<Message> {
        Ok(self.generate_at(Utc::now()))
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Splits `[start, end)` into consecutive step-count periods until the
/// window is used up or roughly `budget` bytes have been produced.
fn cumulative_samples(start: DateTime<Utc>, end: DateTime<Utc>, budget: usize) -> Vec<Cumulative> {
    let mut rng = rand::thread_rng();
    let total = end - start;
    let total_minutes = total.num_seconds() as f64 / 60.0;
    let approx_ms = total.num_milliseconds() as f64 / 10.0;

    let mut samples = Vec::new();
    let mut size = 0usize;
    let mut current = start;

    while size < budget && current < end {
        let factor = 0.5 + rng.gen::<f64>();
        let mut period_end = current + Duration::milliseconds((approx_ms * factor) as i64);
        if period_end > end {
            period_end = end;
        }
        let period = period_end - current;
        let value = (rng.gen_range(0..100) as f64 * (total_minutes / 100.0)).trunc();

        let sample = Cumulative {
            kind: STEPS.to_string(),
            value,
            unit: COUNT.to_string(),
            period_start: rfc3339(current),
            period_end: rfc3339(period_end),
            duration: period.num_seconds(),
        };
        // Rough size of the encoded sample: strings plus two numbers and separators.
        size += sample.kind.len()
            + sample.unit.len()
            + sample.period_start.len()
            + sample.period_end.len()
            + 8 * 2
            + 8;
        samples.push(sample);
        current = period_end;
    }

    samples
}
