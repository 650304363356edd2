//! Run report generation.

use crate::collector::Collected;
use crate::phase::Phase;
use crate::workload::{IssueStats, RunPlan};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub name: String,
    pub phases: Vec<Phase>,
    pub max_in_flight: usize,
    pub confirm_timeout: Duration,
    /// Wall time spent issuing and awaiting calls
    pub duration: Duration,

    pub issued: u64,
    pub supplier_errors: u64,
    pub results: Collected,
}

impl Report {
    pub fn new(plan: &RunPlan, stats: IssueStats, duration: Duration, results: Collected) -> Self {
        Self {
            name: plan.name.clone(),
            phases: plan.phases.clone(),
            max_in_flight: plan.max_in_flight,
            confirm_timeout: plan.confirm_timeout,
            duration,
            issued: stats.issued,
            supplier_errors: stats.supplier_errors,
            results,
        }
    }

    /// Calls issued per second.
    pub fn calls_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.issued as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of completed calls that were confirmed, in percent.
    pub fn success_rate(&self) -> f64 {
        let total = self.results.total();
        if total == 0 {
            0.0
        } else {
            self.results.successes as f64 * 100.0 / total as f64
        }
    }

    pub fn has_errors(&self) -> bool {
        self.results.error_count() > 0 || self.supplier_errors > 0
    }

    /// Generates a markdown report.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!("# pipeprobe report: {}\n\n", self.name));

        md.push_str("## Configuration\n\n");
        md.push_str("| Setting | Value |\n");
        md.push_str("|---------|-------|\n");
        md.push_str(&format!("| Max In Flight | {} |\n", self.max_in_flight));
        md.push_str(&format!(
            "| Confirm Timeout | {:.1}s |\n",
            self.confirm_timeout.as_secs_f64()
        ));
        md.push_str(&format!("| Duration | {:.1}s |\n", self.duration.as_secs_f64()));
        md.push('\n');

        md.push_str("### Phases\n\n");
        md.push_str("| Phase | Duration | Start | End |\n");
        md.push_str("|-------|----------|-------|-----|\n");
        for phase in &self.phases {
            md.push_str(&format!(
                "| {} | {}s | {:.1} rps | {:.1} rps |\n",
                phase.name, phase.duration_secs, phase.start_rps, phase.end_rps
            ));
        }
        md.push('\n');

        md.push_str("## Calls\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Issued | {} |\n", format_number(self.issued)));
        md.push_str(&format!(
            "| Confirmed | {} |\n",
            format_number(self.results.successes)
        ));
        md.push_str(&format!("| Success Rate | {:.2}% |\n", self.success_rate()));
        md.push_str(&format!("| Throughput | {:.1} calls/s |\n", self.calls_per_second()));
        md.push_str(&format!("| Sent | {} |\n", format_bytes(self.results.bytes_sent)));
        md.push_str(&format!("| Supplier Errors | {} |\n", self.supplier_errors));
        for (kind, count) in &self.results.errors {
            md.push_str(&format!("| Errors ({}) | {} |\n", kind, format_number(*count)));
        }
        md.push('\n');

        md.push_str("### End-to-End Latency\n\n");
        md.push_str("| Percentile | Latency |\n");
        md.push_str("|------------|--------|\n");
        let latency = &self.results.latency;
        if latency.count > 0 {
            for (name, us) in [
                ("p50", latency.p50_us),
                ("p95", latency.p95_us),
                ("p99", latency.p99_us),
                ("max", latency.max_us),
            ] {
                md.push_str(&format!("| {} | {:.2}ms |\n", name, us as f64 / 1000.0));
            }
        } else {
            md.push_str("| N/A | No data |\n");
        }
        md.push('\n');

        md.push_str("## Summary\n\n");
        if self.has_errors() {
            md.push_str("**Errors detected during run**\n");
        } else {
            md.push_str("**Run completed without errors**\n");
        }

        md
    }

    /// Generates a JSON report.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Prints a summary to stdout.
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("PIPEPROBE RESULTS: {}", self.name);
        println!("{}", "=".repeat(60));

        println!(
            "\nIssued: {} ({:.1}/s) | Duration: {:.1}s",
            format_number(self.issued),
            self.calls_per_second(),
            self.duration.as_secs_f64()
        );
        println!(
            "Confirmed: {} ({:.2}%)",
            format_number(self.results.successes),
            self.success_rate()
        );
        println!("Sent: {}", format_bytes(self.results.bytes_sent));
        println!("Latency: {}", self.results.latency.format_ms());

        for (kind, count) in &self.results.errors {
            println!("Errors ({}): {}", kind, format_number(*count));
        }
        if self.supplier_errors > 0 {
            println!("Supplier errors: {}", self.supplier_errors);
        }

        println!("\n{}", "=".repeat(60));
    }
}

/// Formats a number with thousand separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Formats bytes in human-readable form.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::LatencyStats;
    use std::collections::BTreeMap;

    fn sample_report() -> Report {
        let plan = RunPlan {
            name: "smoke-1".to_string(),
            phases: vec![Phase::new("increment", 120, 1.0, 200.0)],
            max_in_flight: 256,
            confirm_timeout: Duration::from_secs(10),
            csv_file: None,
        };
        let mut errors = BTreeMap::new();
        errors.insert("timeout".to_string(), 25);
        let results = Collected {
            successes: 75,
            errors,
            bytes_sent: 2048,
            latency: LatencyStats {
                count: 75,
                min_us: 800,
                max_us: 90_000,
                mean_us: 12_000,
                p50_us: 10_000,
                p95_us: 40_000,
                p99_us: 80_000,
            },
        };
        Report::new(
            &plan,
            IssueStats {
                issued: 100,
                supplier_errors: 0,
            },
            Duration::from_secs(10),
            results,
        )
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_rates() {
        let report = sample_report();
        assert_eq!(report.calls_per_second(), 10.0);
        assert_eq!(report.success_rate(), 75.0);
        assert!(report.has_errors());
    }

    #[test]
    fn test_markdown_sections() {
        let md = sample_report().to_markdown();
        assert!(md.contains("# pipeprobe report: smoke-1"));
        assert!(md.contains("| increment | 120s | 1.0 rps | 200.0 rps |"));
        assert!(md.contains("| Errors (timeout) | 25 |"));
        assert!(md.contains("| p95 | 40.00ms |"));
        assert!(md.contains("Errors detected"));
    }

    #[test]
    fn test_json_round_trip() {
        let report = sample_report();
        let back: Report = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(back.issued, 100);
        assert_eq!(back.results, report.results);
    }
}
