//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Hold the engine's operational counters in an injectable, per-instance holder
//! - Produce the read-only health snapshot without touching the network
//! - Mirror every update to the `metrics` facade for Prometheus scraping
//!
//! # Metrics
//! - `watcher_checks_total` (counter): fetches admitted past their breaker
//! - `watcher_checks_failed_total` (counter): fetches that failed
//! - `watcher_emails_sent_total` / `watcher_emails_failed_total` (counter): one per notify call
//! - `watcher_open_breakers` (gauge): breakers currently not closed
//! - `watcher_watchdog_restarts_total` (counter): supervisor restarts
//! - `watcher_monitoring_active` (gauge): 1 while the supervisor loop runs
//! - `watcher_round_duration_seconds` (histogram): wall time per poll round

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

const NO_ROUND_YET: i64 = i64::MIN;

/// Process counters shared by every component of one engine.
#[derive(Debug)]
pub struct EngineMetrics {
    total_checks: AtomicU64,
    failed_checks: AtomicU64,
    emails_sent: AtomicU64,
    emails_failed: AtomicU64,
    open_breakers: AtomicUsize,
    watchdog_restarts: AtomicU64,
    monitoring_active: AtomicBool,
    /// Milliseconds since the epoch, or `NO_ROUND_YET`.
    last_round_at: AtomicI64,
    started_at: DateTime<Utc>,
}

/// Point-in-time view for dashboards and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub monitoring_active: bool,
    pub open_breaker_count: usize,
    pub total_checks: u64,
    pub failed_checks: u64,
    pub emails_sent: u64,
    pub emails_failed: u64,
    pub last_round_at: Option<DateTime<Utc>>,
    pub watchdog_restarts: u64,
    pub uptime_secs: i64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            total_checks: AtomicU64::new(0),
            failed_checks: AtomicU64::new(0),
            emails_sent: AtomicU64::new(0),
            emails_failed: AtomicU64::new(0),
            open_breakers: AtomicUsize::new(0),
            watchdog_restarts: AtomicU64::new(0),
            monitoring_active: AtomicBool::new(false),
            last_round_at: AtomicI64::new(NO_ROUND_YET),
            started_at: Utc::now(),
        }
    }

    /// A fetch got past its breaker and was attempted.
    pub fn record_check(&self) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("watcher_checks_total").increment(1);
    }

    pub fn record_check_failed(&self) {
        self.failed_checks.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("watcher_checks_failed_total").increment(1);
    }

    /// Outcome of one `notify` call (not one attempt).
    pub fn record_email(&self, sent: bool) {
        if sent {
            self.emails_sent.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("watcher_emails_sent_total").increment(1);
        } else {
            self.emails_failed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("watcher_emails_failed_total").increment(1);
        }
    }

    /// A breaker left the closed state.
    pub fn breaker_opened(&self) {
        let open = self.open_breakers.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("watcher_open_breakers").set(open as f64);
    }

    /// A breaker returned to the closed state.
    pub fn breaker_closed(&self) {
        let previous = self
            .open_breakers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        metrics::gauge!("watcher_open_breakers").set(previous.saturating_sub(1) as f64);
    }

    pub fn record_watchdog_restart(&self) {
        self.watchdog_restarts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("watcher_watchdog_restarts_total").increment(1);
    }

    pub fn set_monitoring_active(&self, active: bool) {
        self.monitoring_active.store(active, Ordering::SeqCst);
        metrics::gauge!("watcher_monitoring_active").set(if active { 1.0 } else { 0.0 });
    }

    /// A poll round started at `at` and took `elapsed`.
    pub fn record_round(&self, at: DateTime<Utc>, elapsed: Duration) {
        self.last_round_at
            .store(at.timestamp_millis(), Ordering::SeqCst);
        metrics::histogram!("watcher_round_duration_seconds").record(elapsed.as_secs_f64());
    }

    pub fn open_breakers(&self) -> usize {
        self.open_breakers.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_round_at = match self.last_round_at.load(Ordering::SeqCst) {
            NO_ROUND_YET => None,
            millis => DateTime::from_timestamp_millis(millis),
        };

        HealthSnapshot {
            monitoring_active: self.monitoring_active.load(Ordering::SeqCst),
            open_breaker_count: self.open_breakers(),
            total_checks: self.total_checks.load(Ordering::Relaxed),
            failed_checks: self.failed_checks.load(Ordering::Relaxed),
            emails_sent: self.emails_sent.load(Ordering::Relaxed),
            emails_failed: self.emails_failed.load(Ordering::Relaxed),
            last_round_at,
            watchdog_restarts: self.watchdog_restarts.load(Ordering::Relaxed),
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the Prometheus exporter on its own listener.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}
