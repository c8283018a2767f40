//! Watchdog: a one-child supervisor that restarts the monitor loop when it dies.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;
use crate::error::panic_message;
use crate::lifecycle::ShutdownSignal;
use crate::monitor::{Engine, MonitorSupervisor};
use crate::observability::EngineMetrics;

/// How long the watchdog waits for its child to wind down after shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(120);

/// A spawned task that can be polled for liveness.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    handle: JoinHandle<()>,
    last_error: Option<String>,
}

impl TaskHandle {
    pub fn spawn<F>(name: &'static str, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            handle: tokio::spawn(task),
            last_error: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_done(&self) -> bool {
        self.handle.is_finished()
    }

    /// Why the task last ended, if it ended abnormally.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Wait for the task to end and record how it ended.
    pub async fn join(&mut self) {
        if let Err(e) = (&mut self.handle).await {
            self.last_error = Some(if e.is_panic() {
                panic_message(&*e.into_panic())
            } else {
                e.to_string()
            });
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Restarts its child whenever a periodic check finds it finished.
pub struct Watchdog<F> {
    factory: F,
    period: Duration,
    shutdown: ShutdownSignal,
    metrics: Arc<EngineMetrics>,
}

impl<F, Fut> Watchdog<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(factory: F, period: Duration, shutdown: ShutdownSignal, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            factory,
            period,
            shutdown,
            metrics,
        }
    }

    pub async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        let mut child = TaskHandle::spawn("monitor", (self.factory)());
        tracing::info!(period = ?self.period, "Watchdog started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = shutdown.cancelled() => break,
            }

            if !child.is_done() {
                continue;
            }

            child.join().await;
            if shutdown.is_cancelled() {
                break;
            }
            tracing::warn!(
                task = child.name(),
                last_error = child.last_error().unwrap_or("exited"),
                "Supervised task stopped, restarting"
            );
            self.metrics.record_watchdog_restart();
            child = TaskHandle::spawn("monitor", (self.factory)());
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, child.join()).await.is_err() {
            tracing::warn!(task = child.name(), grace = ?SHUTDOWN_GRACE, "Task did not stop in time, aborting");
            child.abort();
        }
        tracing::info!("Watchdog stopped");
    }
}

/// Spawn the monitor loop under a watchdog.
pub fn spawn_monitoring(engine: Arc<Engine>, config: &MonitorConfig, shutdown: ShutdownSignal) -> JoinHandle<()> {
    let interval = config.poll_interval();
    let metrics = engine.metrics().clone();
    let child_shutdown = shutdown.clone();
    let factory = move || MonitorSupervisor::new(engine.clone(), interval, child_shutdown.clone()).run();

    tokio::spawn(Watchdog::new(factory, config.watchdog_interval(), shutdown, metrics).run())
}
