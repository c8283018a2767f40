//! Circuit breaker for fetch and mail protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: one probe call is testing recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: first call after reset_timeout has elapsed since opened_at
//! Half-Open → Closed: probe succeeds (failures reset to 0)
//! Half-Open → Open: probe fails (opened_at refreshed)
//! ```
//!
//! # Design Decisions
//! - One breaker per protected call-site: per URL for fetches, one shared for mail
//! - Single probe in Half-Open; other callers keep failing fast until it settles
//! - Admission hands out a permit; a permit dropped without an outcome (cancelled
//!   call) releases the probe slot instead of wedging the breaker in Half-Open
//! - Uses Tokio's clock so paused-time tests can drive the reset timeout

use dashmap::DashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::error::CircuitOpen;
use crate::observability::EngineMetrics;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Trip threshold and cool-down for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl BreakerSettings {
    /// Per-site defaults: unreachable sites are common and cheap to suspend.
    pub const SITE: Self = Self {
        failure_threshold: 3,
        reset_timeout: Duration::from_secs(180),
    };

    /// Mail transport defaults: outages are rarer and costlier to mask.
    pub const EMAIL: Self = Self {
        failure_threshold: 5,
        reset_timeout: Duration::from_secs(300),
    };

    pub fn site(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.site_failure_threshold,
            reset_timeout: Duration::from_secs(config.site_reset_timeout_secs),
        }
    }

    pub fn email(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.email_failure_threshold,
            reset_timeout: Duration::from_secs(config.email_reset_timeout_secs),
        }
    }
}

/// Result of a call made through [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error(transparent)]
    Open(CircuitOpen),

    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Three-state failure isolator.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
    metrics: Arc<EngineMetrics>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask to make a call. Denied calls must not touch the dependency.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, CircuitOpen> {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => {}
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed < self.settings.reset_timeout {
                    return Err(CircuitOpen {
                        name: self.name.clone(),
                        retry_in: self.settings.reset_timeout - elapsed,
                    });
                }
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                tracing::info!(breaker = %self.name, "Circuit half-open, probing");
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(CircuitOpen {
                        name: self.name.clone(),
                        retry_in: Duration::ZERO,
                    });
                }
                inner.probe_in_flight = true;
            }
        }

        Ok(BreakerPermit {
            breaker: self,
            settled: false,
        })
    }

    /// Run `op` through the breaker, recording its outcome.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire().map_err(BreakerError::Open)?;
        match op().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(e) => {
                permit.failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        let state = inner.state;
        match state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.probe_in_flight = false;
                drop(inner);
                self.metrics.breaker_closed();
                tracing::info!(breaker = %self.name, "Circuit closed, dependency recovered");
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let failures = inner.consecutive_failures;
        let state = inner.state;
        match state {
            CircuitState::Closed => {
                if failures >= self.settings.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    drop(inner);
                    self.metrics.breaker_opened();
                    tracing::warn!(
                        breaker = %self.name,
                        failures,
                        reset_timeout = ?self.settings.reset_timeout,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                tracing::warn!(breaker = %self.name, failures, "Probe failed, circuit re-opened");
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    fn on_abandoned(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    /// Forget this breaker; keeps the open-breaker gauge honest.
    fn retire(&self) {
        if self.state() != CircuitState::Closed {
            self.metrics.breaker_closed();
        }
    }
}

/// Admission to call the protected dependency once.
///
/// Report the outcome with [`success`](Self::success) or [`failure`](Self::failure).
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned();
        }
    }
}

/// Lazily created breakers keyed by URL.
#[derive(Debug)]
pub struct BreakerTable {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: BreakerSettings,
    metrics: Arc<EngineMetrics>,
}

impl BreakerTable {
    pub fn new(settings: BreakerSettings, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            breakers: DashMap::new(),
            settings,
            metrics,
        }
    }

    /// The breaker for `key`, created closed on first use.
    pub fn get(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return existing.clone();
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(key, self.settings, self.metrics.clone()))
            })
            .clone()
    }

    /// Drop breakers whose key is no longer monitored.
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.breakers.retain(|key, breaker| {
            let retained = keep(key);
            if !retained {
                breaker.retire();
            }
            retained
        });
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Breakers not currently closed.
    pub fn open_count(&self) -> usize {
        self.breakers
            .iter()
            .filter(|b| b.value().state() != CircuitState::Closed)
            .count()
    }
}
