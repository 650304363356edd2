//! Paced workload execution.

use crate::collector::{Collected, Collector};
use crate::phase::Phase;
use crate::report::Report;
use pipeprobe_client::ProtocolClient;
use pipeprobe_core::{MessageSupplier, Response};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Granularity of the rate scheduler.
const TICK: Duration = Duration::from_millis(10);

/// What the runner needs besides the client and the supplier.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub name: String,
    pub phases: Vec<Phase>,
    pub max_in_flight: usize,
    pub confirm_timeout: Duration,
    pub csv_file: Option<PathBuf>,
}

/// Counters kept by the issuing loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueStats {
    pub issued: u64,
    pub supplier_errors: u64,
}

/// Issues calls following `phases`.
///
/// Within a phase the target rate is interpolated linearly and converted
/// into call credits every tick; a call is started for every whole credit.
/// At most `max_in_flight` calls run at once, further calls wait for a free
/// slot. Stops early when `shutdown` fires, then waits for running calls.
pub async fn issue_calls(
    plan: &RunPlan,
    client: Arc<dyn ProtocolClient>,
    supplier: Arc<dyn MessageSupplier>,
    responses: mpsc::UnboundedSender<Response>,
    shutdown: &CancellationToken,
) -> IssueStats {
    let mut stats = IssueStats::default();
    let slots = Arc::new(Semaphore::new(plan.max_in_flight.max(1)));
    let mut in_flight = JoinSet::new();

    'phases: for phase in &plan.phases {
        info!(
            phase = %phase.name,
            duration_secs = phase.duration_secs,
            start_rps = phase.start_rps,
            end_rps = phase.end_rps,
            "starting phase"
        );
        let phase_start = Instant::now();
        let phase_end = phase_start + phase.duration();
        let mut credits = 0.0_f64;
        let mut last = phase_start;

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break 'phases,
                _ = ticker.tick() => {}
            }

            let now = Instant::now().min(phase_end);
            let rate = phase.rate_at(now - phase_start);
            credits += rate * (now - last).as_secs_f64();
            last = now;

            while credits >= 1.0 {
                credits -= 1.0;

                let permit = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break 'phases,
                    permit = slots.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'phases,
                    },
                };

                let message = match supplier.get_data() {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "supplier failed, skipping call");
                        stats.supplier_errors += 1;
                        continue;
                    }
                };

                let client = Arc::clone(&client);
                let responses = responses.clone();
                let timeout = plan.confirm_timeout;
                in_flight.spawn(async move {
                    let _permit = permit;
                    let cancel = CancellationToken::new();
                    let deadline = tokio::spawn({
                        let cancel = cancel.clone();
                        async move {
                            tokio::time::sleep(timeout).await;
                            cancel.cancel();
                        }
                    });
                    let response = client.call_endpoint(&message, &cancel).await;
                    deadline.abort();
                    let _ = responses.send(response);
                });
                stats.issued += 1;
            }

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!("call task failed: {}", e);
                }
            }

            if now >= phase_end {
                break;
            }
        }
        debug!(phase = %phase.name, issued = stats.issued, "phase complete");
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!("call task failed: {}", e);
        }
    }

    stats
}

/// Runs the whole plan and builds the report.
pub async fn run_workload(
    plan: RunPlan,
    client: Arc<dyn ProtocolClient>,
    supplier: Arc<dyn MessageSupplier>,
    shutdown: CancellationToken,
) -> anyhow::Result<Report> {
    info!(
        name = %plan.name,
        phases = plan.phases.len(),
        max_in_flight = plan.max_in_flight,
        "starting workload"
    );

    let collector = Collector::new(plan.csv_file.as_deref())?;
    let (tx, rx) = mpsc::unbounded_channel();
    let collector_handle = collector.spawn(rx);

    let started = Instant::now();
    let stats = issue_calls(&plan, client, supplier, tx, &shutdown).await;
    let duration = started.elapsed();

    let collected = match collector_handle.await {
        Ok(collected) => collected,
        Err(e) => {
            error!("collector task failed: {}", e);
            Collected::default()
        }
    };

    info!(issued = stats.issued, elapsed = ?duration, "workload completed");
    Ok(Report::new(&plan, stats, duration, collected))
}
