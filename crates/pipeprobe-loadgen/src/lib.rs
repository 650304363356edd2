//! Load generator measuring end-to-end latency of telemetry ingestion
//! pipelines.
//!
//! Every call publishes a synthetic message (MQTT or HTTP) and waits until
//! the pipeline emits it on its output topic. The time between the two is
//! the measured latency.
//!
//! # Presets
//! - `smoke`: one 2-minute ramp from 1 to 200 calls/s
//! - `average`: 5-minute ramp to 200 calls/s, 30 minutes rising to 250, 5-minute ramp down
//! - `custom`: phases listed in the configuration
//!
//! # Usage
//! ```bash
//! # Write an example configuration
//! pipeprobe generate-config pipeprobe.yml
//!
//! # Run it, saving markdown and JSON reports
//! pipeprobe run --config pipeprobe.yml --output report --json
//! ```

pub mod collector;
pub mod config;
pub mod phase;
pub mod report;
pub mod workload;

pub use collector::{Collected, Collector, LatencyStats};
pub use config::Config;
pub use phase::{Phase, Preset};
pub use report::Report;
pub use workload::{issue_calls, run_workload, IssueStats, RunPlan};
