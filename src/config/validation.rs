//! Configuration validation.
//!
//! Semantic checks only; serde handles syntax. Every problem is reported,
//! not just the first. Missing SMTP credentials are deliberately not an
//! error: the notifier degrades to failing fast instead.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::WatcherConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &WatcherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.registry.path.trim().is_empty() {
        errors.push(ValidationError::new("registry.path", "must not be empty"));
    }

    let monitor = &config.monitor;
    if monitor.max_concurrent_fetches == 0 {
        errors.push(ValidationError::new(
            "monitor.max_concurrent_fetches",
            "must be at least 1",
        ));
    }
    if monitor.fetch_timeout_secs == 0 {
        errors.push(ValidationError::new("monitor.fetch_timeout_secs", "must be > 0"));
    }
    if monitor.watchdog_interval_secs == 0 {
        errors.push(ValidationError::new("monitor.watchdog_interval_secs", "must be > 0"));
    }
    if monitor.max_notify_failures == Some(0) {
        errors.push(ValidationError::new(
            "monitor.max_notify_failures",
            "must be at least 1 when set",
        ));
    }

    let breakers = &config.breakers;
    if breakers.site_failure_threshold == 0 {
        errors.push(ValidationError::new("breakers.site_failure_threshold", "must be > 0"));
    }
    if breakers.email_failure_threshold == 0 {
        errors.push(ValidationError::new("breakers.email_failure_threshold", "must be > 0"));
    }

    let smtp = &config.smtp;
    if smtp.max_attempts == 0 {
        errors.push(ValidationError::new("smtp.max_attempts", "must be at least 1"));
    }
    if smtp.timeout_secs == 0 {
        errors.push(ValidationError::new("smtp.timeout_secs", "must be > 0"));
    }
    if smtp.max_delay_ms < smtp.base_delay_ms {
        errors.push(ValidationError::new(
            "smtp.max_delay_ms",
            "must not be below smtp.base_delay_ms",
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
