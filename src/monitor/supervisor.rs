//! The long-running monitor loop.
//!
//! # State Machine
//! ```text
//! round ok    → consecutive_errors = 0 → sleep(interval)
//! round fault → consecutive_errors += 1 → sleep(min(60s · 2^n, 1h))
//! shutdown    → exit at the top of the loop or during the sleep
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::MIN_POLL_INTERVAL_SECS;
use crate::lifecycle::ShutdownSignal;
use crate::monitor::Engine;
use crate::observability::EngineMetrics;
use crate::resilience::backoff::loop_backoff;

/// Runs poll rounds until shutdown.
pub struct MonitorSupervisor {
    engine: Arc<Engine>,
    interval: Duration,
    shutdown: ShutdownSignal,
}

impl MonitorSupervisor {
    /// `interval` is raised to the poll floor if it is shorter.
    pub fn new(engine: Arc<Engine>, interval: Duration, shutdown: ShutdownSignal) -> Self {
        Self {
            engine,
            interval: interval.max(Duration::from_secs(MIN_POLL_INTERVAL_SECS)),
            shutdown,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run(self) {
        let _active = ActiveFlag::raise(self.engine.metrics().clone());
        let mut shutdown = self.shutdown.clone();
        let mut consecutive_errors: u32 = 0;

        tracing::info!(interval = ?self.interval, "Monitor loop started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let delay = match self.engine.run_round(&shutdown).await {
                Ok(_) => {
                    consecutive_errors = 0;
                    self.interval
                }
                Err(fault) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    let backoff = loop_backoff(consecutive_errors);
                    tracing::error!(
                        error = %fault,
                        consecutive_errors,
                        backoff = ?backoff,
                        "Poll round faulted, backing off"
                    );
                    backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!("Monitor loop stopped");
    }
}

/// Holds `monitoring_active` up for as long as the loop is alive, including
/// when it unwinds.
struct ActiveFlag {
    metrics: Arc<EngineMetrics>,
}

impl ActiveFlag {
    fn raise(metrics: Arc<EngineMetrics>) -> Self {
        metrics.set_monitoring_active(true);
        Self { metrics }
    }
}

impl Drop for ActiveFlag {
    fn drop(&mut self) {
        self.metrics.set_monitoring_active(false);
    }
}
