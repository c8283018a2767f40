//! The engine: collaborators plus round serialisation and persistence.

use chrono::Utc;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use crate::config::WatcherConfig;
use crate::error::{panic_message, SupervisorFault};
use crate::fetch::{Fingerprinter, HttpFingerprinter};
use crate::lifecycle::ShutdownSignal;
use crate::monitor::round::{PollRound, RoundReport, RoundSettings, RoundSummary};
use crate::notify::{build_transport, Notifier};
use crate::observability::{EngineMetrics, HealthSnapshot};
use crate::registry::{merge_checked, JsonFileRegistry, SiteRegistry, Target};
use crate::resilience::{AdaptiveTimeouts, BreakerSettings, BreakerTable};

/// Change-detection engine.
///
/// Owns the per-URL breakers and adaptive timeouts so they survive across
/// rounds. Rounds never overlap: a round requested while another is running
/// waits for it.
pub struct Engine {
    registry: Arc<dyn SiteRegistry>,
    fetcher: Arc<dyn Fingerprinter>,
    notifier: Arc<Notifier>,
    breakers: BreakerTable,
    timeouts: AdaptiveTimeouts,
    metrics: Arc<EngineMetrics>,
    settings: RoundSettings,
    round_lock: tokio::sync::Mutex<()>,
    /// Last round's result when it could not be saved.
    unsaved: Mutex<Option<Vec<Target>>>,
}

impl Engine {
    pub fn new(
        registry: Arc<dyn SiteRegistry>,
        fetcher: Arc<dyn Fingerprinter>,
        notifier: Arc<Notifier>,
        config: &WatcherConfig,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            notifier,
            breakers: BreakerTable::new(BreakerSettings::site(&config.breakers), metrics.clone()),
            timeouts: AdaptiveTimeouts::new(config.monitor.fetch_timeout()),
            metrics,
            settings: RoundSettings::from_config(&config.monitor),
            round_lock: tokio::sync::Mutex::new(()),
            unsaved: Mutex::new(None),
        }
    }

    /// Production wiring: JSON file registry, reqwest fetcher, SMTP notifier.
    pub fn from_config(config: &WatcherConfig, metrics: Arc<EngineMetrics>) -> Result<Self, reqwest::Error> {
        let registry = Arc::new(JsonFileRegistry::from_config(&config.registry));
        let fetcher = Arc::new(HttpFingerprinter::new()?);
        let notifier = Arc::new(Notifier::from_config(
            build_transport(&config.smtp),
            config,
            metrics.clone(),
        ));
        Ok(Self::new(registry, fetcher, notifier, config, metrics))
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn breakers(&self) -> &BreakerTable {
        &self.breakers
    }

    /// Run one round now ("check now").
    pub async fn run_once(&self) -> Result<RoundSummary, SupervisorFault> {
        self.run_round(&ShutdownSignal::never()).await
    }

    /// Run one round that stops admitting targets once `signal` fires.
    ///
    /// Target failures are absorbed into the summary; only a fault in the
    /// engine's own logic is returned as an error.
    pub async fn run_round(&self, signal: &ShutdownSignal) -> Result<RoundSummary, SupervisorFault> {
        AssertUnwindSafe(self.round(signal))
            .catch_unwind()
            .await
            .map_err(|payload| SupervisorFault::Panicked(panic_message(&*payload)))
    }

    /// Read-only counters; never touches the network.
    pub fn health(&self) -> HealthSnapshot {
        self.metrics.snapshot()
    }

    async fn round(&self, signal: &ShutdownSignal) -> RoundSummary {
        let _round = self.round_lock.lock().await;
        let started_at = Utc::now();
        let clock = Instant::now();

        let targets = self.targets_for_round().await;
        let monitored = |url: &str| targets.iter().any(|target| target.url == url);
        self.breakers.retain(monitored);
        self.timeouts.retain(monitored);

        if targets.is_empty() {
            tracing::info!("No targets registered");
            self.metrics.record_round(started_at, clock.elapsed());
            return RoundSummary::default();
        }

        tracing::info!(targets = targets.len(), "Poll round starting");
        let RoundReport { targets, summary, .. } = PollRound::new(
            self.fetcher.as_ref(),
            &self.notifier,
            &self.breakers,
            &self.timeouts,
            &self.metrics,
            &self.settings,
        )
        .run(targets, signal)
        .await;

        self.persist(targets).await;
        self.metrics.record_round(started_at, clock.elapsed());

        tracing::info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            notified = summary.notified,
            elapsed = ?clock.elapsed(),
            "Poll round complete"
        );
        summary
    }

    async fn targets_for_round(&self) -> Vec<Target> {
        let pending = self.lock_unsaved().clone();
        match pending {
            Some(targets) => {
                tracing::warn!(
                    targets = targets.len(),
                    "Previous save failed, using in-memory targets"
                );
                targets
            }
            None => self.registry.load().await,
        }
    }

    async fn persist(&self, checked: Vec<Target>) {
        let merged = match self.registry.try_load().await {
            Ok(current) => merge_checked(current, &checked),
            Err(e) => {
                tracing::warn!(error = %e, "Could not re-read registry before save, saving round result as-is");
                checked
            }
        };

        match self.registry.save(&merged).await {
            Ok(()) => *self.lock_unsaved() = None,
            Err(e) => {
                tracing::error!(error = %e, "Failed to save registry, keeping results in memory");
                *self.lock_unsaved() = Some(merged);
            }
        }
    }

    fn lock_unsaved(&self) -> MutexGuard<'_, Option<Vec<Target>>> {
        self.unsaved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
