//! Response collection: latency histogram, error counts and CSV rows.

use anyhow::Context;
use chrono::SecondsFormat;
use hdrhistogram::Histogram;
use pipeprobe_core::Response;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Highest latency the histogram tracks, in microseconds.
const MAX_TRACKED_US: u64 = 600_000_000;

/// Latency statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl LatencyStats {
    pub fn from_histogram(histogram: &Histogram<u64>) -> Self {
        if histogram.is_empty() {
            return Self::default();
        }

        Self {
            count: histogram.len(),
            min_us: histogram.min(),
            max_us: histogram.max(),
            mean_us: histogram.mean() as u64,
            p50_us: histogram.value_at_quantile(0.50),
            p95_us: histogram.value_at_quantile(0.95),
            p99_us: histogram.value_at_quantile(0.99),
        }
    }

    /// Formats latency as a human-readable string.
    pub fn format_ms(&self) -> String {
        if self.count == 0 {
            "N/A".to_string()
        } else {
            format!(
                "p50={:.1}ms p95={:.1}ms p99={:.1}ms max={:.1}ms",
                self.p50_us as f64 / 1000.0,
                self.p95_us as f64 / 1000.0,
                self.p99_us as f64 / 1000.0,
                self.max_us as f64 / 1000.0
            )
        }
    }
}

/// Aggregated outcome of all collected responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collected {
    pub successes: u64,
    /// Failed calls per `CallError::kind`
    pub errors: BTreeMap<String, u64>,
    pub bytes_sent: u64,
    /// Latency of successful calls
    pub latency: LatencyStats,
}

impl Collected {
    pub fn error_count(&self) -> u64 {
        self.errors.values().sum()
    }

    pub fn total(&self) -> u64 {
        self.successes + self.error_count()
    }
}

/// One CSV row per call.
#[derive(Debug, Serialize)]
struct CsvRow {
    timestamp: String,
    error: String,
    latency_us: u64,
    message_size: Option<usize>,
}

impl From<&Response> for CsvRow {
    fn from(response: &Response) -> Self {
        Self {
            timestamp: response
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            error: response
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            latency_us: duration_us(response),
            message_size: response.message_size,
        }
    }
}

fn duration_us(response: &Response) -> u64 {
    u64::try_from(response.latency.as_micros()).unwrap_or(u64::MAX)
}

/// Folds responses into a [`Collected`] summary.
pub struct Collector {
    histogram: Histogram<u64>,
    collected: Collected,
    csv: Option<csv::Writer<File>>,
}

impl Collector {
    pub fn new(csv_path: Option<&Path>) -> anyhow::Result<Self> {
        let histogram = Histogram::<u64>::new_with_bounds(1, MAX_TRACKED_US, 3)
            .context("creating latency histogram")?;
        let csv = csv_path
            .map(|path| {
                csv::Writer::from_path(path)
                    .with_context(|| format!("creating CSV file {}", path.display()))
            })
            .transpose()?;

        Ok(Self {
            histogram,
            collected: Collected::default(),
            csv,
        })
    }

    pub fn record(&mut self, response: &Response) {
        if let Some(size) = response.message_size {
            self.collected.bytes_sent += size as u64;
        }

        match &response.error {
            None => {
                self.collected.successes += 1;
                let us = duration_us(response).clamp(1, MAX_TRACKED_US);
                let _ = self.histogram.record(us);
            }
            Some(error) => {
                *self.collected.errors.entry(error.kind().to_string()).or_default() += 1;
            }
        }

        if let Some(writer) = self.csv.as_mut() {
            if let Err(e) = writer.serialize(CsvRow::from(response)) {
                warn!(error = %e, "failed to write CSV row");
            }
        }
    }

    pub fn finish(mut self) -> Collected {
        if let Some(writer) = self.csv.as_mut() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "failed to flush CSV file");
            }
        }
        self.collected.latency = LatencyStats::from_histogram(&self.histogram);
        self.collected
    }

    /// Spawns a task draining `rx` until every sender is gone.
    pub fn spawn(mut self, mut rx: mpsc::UnboundedReceiver<Response>) -> JoinHandle<Collected> {
        tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                self.record(&response);
            }
            let collected = self.finish();
            info!(
                successes = collected.successes,
                errors = collected.error_count(),
                "collector finished"
            );
            collected
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pipeprobe_core::CallError;
    use std::time::Duration;

    #[test]
    fn test_record_counts_and_latency() {
        let mut collector = Collector::new(None).unwrap();
        let now = Utc::now();
        for ms in 1..=100 {
            collector.record(&Response::success(now, Duration::from_millis(ms), 10));
        }
        collector.record(&Response::failure(
            now,
            CallError::Timeout,
            Duration::from_secs(10),
            Some(10),
        ));
        collector.record(&Response::failure(
            now,
            CallError::Encode("bad".to_string()),
            Duration::ZERO,
            None,
        ));

        let collected = collector.finish();
        assert_eq!(collected.successes, 100);
        assert_eq!(collected.errors["timeout"], 1);
        assert_eq!(collected.errors["encode"], 1);
        assert_eq!(collected.total(), 102);
        assert_eq!(collected.bytes_sent, 1010);

        let latency = &collected.latency;
        assert_eq!(latency.count, 100);
        // hdrhistogram keeps 3 significant digits
        assert!((49_900..=50_100).contains(&latency.p50_us));
        assert!(latency.max_us >= 99_900);
    }

    #[test]
    fn test_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let mut collector = Collector::new(Some(&path)).unwrap();

        let now = Utc::now();
        collector.record(&Response::success(now, Duration::from_micros(1500), 42));
        collector.record(&Response::failure(
            now,
            CallError::Rejected {
                status: 503,
                body: "busy".to_string(),
            },
            Duration::from_micros(700),
            Some(42),
        ));
        collector.finish();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["timestamp", "error", "latency_us", "message_size"]
        );

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "");
        assert_eq!(&rows[0][2], "1500");
        assert_eq!(&rows[0][3], "42");
        assert!(rows[1][1].contains("503"));
    }

    #[test]
    fn test_empty_latency_stats() {
        let collected = Collector::new(None).unwrap().finish();
        assert_eq!(collected.latency, LatencyStats::default());
        assert_eq!(collected.latency.format_ms(), "N/A");
    }

    #[tokio::test]
    async fn test_spawned_collector_drains_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Collector::new(None).unwrap().spawn(rx);

        for _ in 0..5 {
            tx.send(Response::success(Utc::now(), Duration::from_millis(2), 1)).unwrap();
        }
        drop(tx);

        let collected = handle.await.unwrap();
        assert_eq!(collected.successes, 5);
    }
}
