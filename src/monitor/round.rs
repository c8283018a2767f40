//! One poll round: check every target once, concurrently, behind a gate.
//!
//! Per target: slot → breaker → fetch → first-seen / unchanged / changed → settle → release.
//! A target's failure (or panic) only ever produces its own outcome.

use chrono::Utc;
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::MonitorConfig;
use crate::error::{panic_message, FetchError, FetchErrorKind};
use crate::fetch::Fingerprinter;
use crate::lifecycle::ShutdownSignal;
use crate::notify::{change_notice, Notifier};
use crate::observability::EngineMetrics;
use crate::registry::Target;
use crate::resilience::{AdaptiveTimeouts, BreakerTable};

/// Knobs for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSettings {
    /// Width of the admission gate.
    pub max_concurrent: usize,
    /// Pause after each target before its slot is handed on.
    pub settle_delay: Duration,
    /// Consecutive failed notifications after which a change is accepted silently.
    pub max_notify_failures: Option<u32>,
}

impl RoundSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_fetches,
            settle_delay: config.settle_delay(),
            max_notify_failures: config.max_notify_failures,
        }
    }
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            settle_delay: Duration::from_secs(1),
            max_notify_failures: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    BreakerOpen,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    Fetch(FetchError),
    /// Change detected, notification not delivered; retried next round.
    NotificationFailed,
    /// Change accepted without notification after too many failed attempts.
    NotificationAbandoned,
    Panicked(String),
}

/// What happened to one target in one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    FirstSeen { hash: String },
    Unchanged,
    Updated { hash: String },
    Skipped(SkipReason),
    Failed(CheckFailure),
}

impl CheckOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CheckOutcome::FirstSeen { .. } | CheckOutcome::Unchanged | CheckOutcome::Updated { .. }
        )
    }
}

/// Outcome counts; `succeeded + skipped + failed` equals the target count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Changes whose notification was delivered.
    pub notified: usize,
}

impl RoundSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    fn tally(&mut self, outcome: &CheckOutcome) {
        match outcome {
            CheckOutcome::Updated { .. } => {
                self.succeeded += 1;
                self.notified += 1;
            }
            CheckOutcome::FirstSeen { .. } | CheckOutcome::Unchanged => self.succeeded += 1,
            CheckOutcome::Skipped(_) => self.skipped += 1,
            CheckOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Everything a round produced, in target order.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub targets: Vec<Target>,
    pub outcomes: Vec<CheckOutcome>,
    pub summary: RoundSummary,
}

/// Borrowed view of the engine's collaborators for the length of one round.
pub struct PollRound<'a> {
    fetcher: &'a dyn Fingerprinter,
    notifier: &'a Notifier,
    breakers: &'a BreakerTable,
    timeouts: &'a AdaptiveTimeouts,
    metrics: &'a EngineMetrics,
    settings: &'a RoundSettings,
}

type Checked = (CheckOutcome, Option<Target>);

impl<'a> PollRound<'a> {
    pub fn new(
        fetcher: &'a dyn Fingerprinter,
        notifier: &'a Notifier,
        breakers: &'a BreakerTable,
        timeouts: &'a AdaptiveTimeouts,
        metrics: &'a EngineMetrics,
        settings: &'a RoundSettings,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            breakers,
            timeouts,
            metrics,
            settings,
        }
    }

    /// Check every target and wait for all of them.
    ///
    /// Targets whose check did not complete come back unchanged.
    pub async fn run(&self, targets: Vec<Target>, signal: &ShutdownSignal) -> RoundReport {
        let gate = Semaphore::new(self.settings.max_concurrent.max(1));

        let results = join_all(targets.iter().map(|target| {
            AssertUnwindSafe(self.check_target(&gate, target, signal.clone())).catch_unwind()
        }))
        .await;

        let mut summary = RoundSummary::default();
        let mut outcomes = Vec::with_capacity(targets.len());
        let mut checked = Vec::with_capacity(targets.len());

        for (target, result) in targets.into_iter().zip(results) {
            let (outcome, next) = match result {
                Ok(checked) => checked,
                Err(payload) => {
                    let message = panic_message(&*payload);
                    tracing::error!(url = %target.url, panic = %message, "Target check panicked");
                    (CheckOutcome::Failed(CheckFailure::Panicked(message)), None)
                }
            };
            summary.tally(&outcome);
            outcomes.push(outcome);
            checked.push(next.unwrap_or(target));
        }

        RoundReport {
            targets: checked,
            outcomes,
            summary,
        }
    }

    async fn check_target(&self, gate: &Semaphore, target: &Target, mut signal: ShutdownSignal) -> Checked {
        let _slot = tokio::select! {
            biased;
            _ = signal.cancelled() => return (CheckOutcome::Skipped(SkipReason::Cancelled), None),
            slot = gate.acquire() => match slot {
                Ok(slot) => slot,
                Err(_) => return (CheckOutcome::Skipped(SkipReason::Cancelled), None),
            },
        };

        let checked = self.check_admitted(target, &mut signal).await;

        if !signal.is_cancelled() && !self.settings.settle_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.settings.settle_delay) => {}
                _ = signal.cancelled() => {}
            }
        }
        checked
    }

    async fn check_admitted(&self, target: &Target, signal: &mut ShutdownSignal) -> Checked {
        let breaker = self.breakers.get(&target.url);
        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(open) => {
                tracing::debug!(url = %target.url, retry_in = ?open.retry_in, "Breaker open, skipping target");
                return (CheckOutcome::Skipped(SkipReason::BreakerOpen), None);
            }
        };

        let timeout = self.timeouts.timeout_for(&target.url);
        self.metrics.record_check();

        let fetched = tokio::select! {
            biased;
            _ = signal.cancelled() => {
                tracing::debug!(url = %target.url, "Fetch abandoned on shutdown");
                return (CheckOutcome::Skipped(SkipReason::Cancelled), None);
            }
            fetched = tokio::time::timeout(timeout, self.fetcher.fetch(&target.url, timeout)) => {
                fetched.unwrap_or_else(|_| {
                    Err(FetchError::new(&target.url, FetchErrorKind::Timeout(timeout)))
                })
            }
        };

        let fingerprint = match fetched {
            Ok(fingerprint) => {
                permit.success();
                fingerprint
            }
            Err(e) => {
                permit.failure();
                self.metrics.record_check_failed();
                tracing::warn!(url = %target.url, error = %e, "Check failed");
                return (CheckOutcome::Failed(CheckFailure::Fetch(e)), None);
            }
        };

        self.timeouts.record_success(&target.url, fingerprint.elapsed);
        self.apply_fingerprint(target, fingerprint.hash).await
    }

    async fn apply_fingerprint(&self, target: &Target, hash: String) -> Checked {
        let checked_at = Utc::now();
        let mut next = target.clone();
        next.last_checked_at = Some(checked_at);

        if target.is_unseen() {
            tracing::info!(url = %target.url, name = %target.display_name(), "First fingerprint recorded");
            next.content_hash.clone_from(&hash);
            return (CheckOutcome::FirstSeen { hash }, Some(next));
        }

        if target.content_hash == hash {
            tracing::debug!(url = %target.url, "Content unchanged");
            return (CheckOutcome::Unchanged, Some(next));
        }

        tracing::info!(
            url = %target.url,
            name = %target.display_name(),
            previous = %target.content_hash,
            current = %hash,
            "Change detected"
        );

        let notice = change_notice(target, checked_at);
        if self
            .notifier
            .notify(&target.email, &notice.subject, &notice.body)
            .await
        {
            next.content_hash.clone_from(&hash);
            next.last_notified_at = Some(Utc::now());
            next.notify_failures = 0;
            return (CheckOutcome::Updated { hash }, Some(next));
        }

        next.notify_failures = next.notify_failures.saturating_add(1);
        match self.settings.max_notify_failures {
            Some(cap) if next.notify_failures >= cap => {
                tracing::warn!(
                    url = %target.url,
                    failures = next.notify_failures,
                    "Notification abandoned, accepting new fingerprint"
                );
                next.content_hash = hash;
                next.notify_failures = 0;
                (CheckOutcome::Failed(CheckFailure::NotificationAbandoned), Some(next))
            }
            _ => {
                tracing::warn!(
                    url = %target.url,
                    failures = next.notify_failures,
                    "Notification failed, change will be retried next round"
                );
                (CheckOutcome::Failed(CheckFailure::NotificationFailed), Some(next))
            }
        }
    }
}
