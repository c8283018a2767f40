//! Error taxonomy for the watcher.
//!
//! # Propagation
//! ```text
//! FetchError, CircuitOpen  → absorbed per target (Failed / Skipped outcome)
//! TransportError           → absorbed inside Notifier, surfaces as `false`
//! StorageError             → load: empty target list; save: logged, in-memory copy kept
//! SupervisorFault          → loop-level backoff, watchdog restart
//! ```

use std::time::Duration;
use thiserror::Error;

/// Why a single fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchErrorKind {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("non-success status {0}")]
    Status(u16),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Network or HTTP failure for one target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch of {url} failed: {kind}")]
pub struct FetchError {
    pub url: String,
    pub kind: FetchErrorKind,
}

impl FetchError {
    pub fn new(url: impl Into<String>, kind: FetchErrorKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// Fast-fail from an open circuit breaker; the operation was not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{name}' is open (retry in {retry_in:?})")]
pub struct CircuitOpen {
    pub name: String,
    pub retry_in: Duration,
}

/// Notification delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("mail transport credentials are not configured")]
    NotConfigured,

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("could not build message: {0}")]
    Message(String),

    #[error("smtp error: {0}")]
    Smtp(String),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Retrying cannot help; the mail server was never at fault.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TransportError::NotConfigured
                | TransportError::InvalidAddress { .. }
                | TransportError::Message(_)
        )
    }
}

/// Registry read/write failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("registry io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("registry data is malformed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The engine's own logic broke while running a round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorFault {
    #[error("poll round panicked: {0}")]
    Panicked(String),
}

/// Failures of the registration helpers used by the CLI.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("url is already registered: {0}")]
    Duplicate(String),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("no target registered for {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
