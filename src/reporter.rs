use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{MetricError, Result};
use crate::format::UNAVAILABLE;
use crate::sampler::{self, MetricsSampler};

/// Periodic lines carry the raw reading. Only snapshot entries are rounded.
pub fn cpu_line(usage: &Result<f64>) -> String {
    match usage {
        Ok(value) => format!("CpuUsage: {}", value),
        Err(_) => format!("CpuUsage: {}", UNAVAILABLE),
    }
}

/// Emits one `CpuUsage` line per period. A tick waits for the previous
/// sample to finish, so samples never overlap and lines keep their order.
/// A sample that outlives `query_timeout` stays in flight; later ticks
/// report `unavailable` until it returns instead of queueing more work
/// behind it.
pub struct PeriodicReporter {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl PeriodicReporter {
    /// The first sample is taken one full period after spawning.
    pub fn spawn(
        sampler: Arc<MetricsSampler>,
        period: Duration,
        query_timeout: Duration,
        sink: mpsc::Sender<String>,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let first_tick = Instant::now() + period;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut in_flight: Option<JoinHandle<Result<f64>>> = None;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = interval.tick() => {
                        let usage = sample(&sampler, query_timeout, &mut in_flight).await;
                        if let Err(e) = &usage {
                            warn!("CPU sample failed: {}", e);
                        }
                        if sink.send(cpu_line(&usage)).await.is_err() {
                            debug!("Report sink closed, stopping reporter");
                            break;
                        }
                    }
                }
            }
        });

        PeriodicReporter { stop, handle }
    }

    pub async fn shutdown(self) {
        // The task may already have exited on a closed sink.
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!("Reporter task ended abnormally: {}", e);
        }
    }
}

async fn sample(
    sampler: &Arc<MetricsSampler>,
    query_timeout: Duration,
    in_flight: &mut Option<JoinHandle<Result<f64>>>,
) -> Result<f64> {
    if let Some(task) = in_flight.take() {
        if !task.is_finished() {
            *in_flight = Some(task);
            debug!("Previous CPU sample still running, skipping tick");
            return Err(MetricError::transient("cpu"));
        }
        // Belongs to a tick that was already reported.
        debug!("Discarding late CPU sample");
    }

    let mut task = sampler::spawn_query(sampler, |s| s.cpu_usage());
    let usage = sampler::await_query(&mut task, query_timeout, "cpu").await;
    if !task.is_finished() {
        *in_flight = Some(task);
    }
    usage
}
