//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the watcher.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest poll interval accepted; smaller values are clamped up to it.
pub const MIN_POLL_INTERVAL_SECS: u64 = 60;

/// Root configuration for the site watcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WatcherConfig {
    /// Where the target list lives.
    pub registry: RegistryConfig,

    /// Poll round and supervisor settings.
    pub monitor: MonitorConfig,

    /// Circuit breaker thresholds.
    pub breakers: BreakerConfig,

    /// Mail transport and notifier retry settings.
    pub smtp: SmtpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Registry storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path of the JSON target list.
    pub path: String,

    /// Keep one `.bak` copy of the previous list on every save.
    pub keep_backup: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: "sites.json".to_string(),
            keep_backup: true,
        }
    }
}

/// Polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between rounds (floor: [`MIN_POLL_INTERVAL_SECS`]).
    pub interval_secs: u64,

    /// Default per-fetch timeout in seconds.
    pub fetch_timeout_secs: u64,

    /// Maximum fetches in flight at once.
    pub max_concurrent_fetches: usize,

    /// Delay a slot is held after a target finishes, in milliseconds.
    pub settle_delay_ms: u64,

    /// Watchdog wake-up period in seconds.
    pub watchdog_interval_secs: u64,

    /// Give up notifying a change after this many consecutive failures.
    /// `None` retries every round until delivery succeeds.
    pub max_notify_failures: Option<u32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            fetch_timeout_secs: 10,
            max_concurrent_fetches: 5,
            settle_delay_ms: 1000,
            watchdog_interval_secs: 60,
            max_notify_failures: None,
        }
    }
}

impl MonitorConfig {
    /// Poll interval with the floor applied.
    pub fn poll_interval(&self) -> Duration {
        if self.interval_secs < MIN_POLL_INTERVAL_SECS {
            tracing::warn!(
                configured = self.interval_secs,
                floor = MIN_POLL_INTERVAL_SECS,
                "Poll interval below floor, clamping"
            );
        }
        Duration::from_secs(self.interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive fetch failures before a site's breaker opens.
    pub site_failure_threshold: u32,

    /// Seconds a site's breaker stays open before a probe.
    pub site_reset_timeout_secs: u64,

    /// Consecutive send failures before the email breaker opens.
    pub email_failure_threshold: u32,

    /// Seconds the email breaker stays open before a probe.
    pub email_reset_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            site_failure_threshold: 3,
            site_reset_timeout_secs: 180,
            email_failure_threshold: 5,
            email_reset_timeout_secs: 300,
        }
    }
}

/// SMTP transport and notifier retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// SMTP relay host (STARTTLS).
    pub server: String,

    /// SMTP port.
    pub port: u16,

    pub username: String,

    pub password: String,

    /// Sender address.
    pub from_email: String,

    /// Per-attempt send timeout in seconds.
    pub timeout_secs: u64,

    /// Attempts per notification.
    pub max_attempts: u32,

    /// First retry delay in milliseconds; doubles per attempt.
    pub base_delay_ms: u64,

    /// Ceiling for the retry delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: "smtp.gmail.com".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from_email: String::new(),
            timeout_secs: 30,
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
        }
    }
}

impl SmtpConfig {
    /// True when every credential needed to send is present.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty() && !self.from_email.is_empty()
    }

    /// Names of the missing credential settings.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.username.is_empty() {
            missing.push("SMTP_USERNAME");
        }
        if self.password.is_empty() {
            missing.push("SMTP_PASSWORD");
        }
        if self.from_email.is_empty() {
            missing.push("FROM_EMAIL");
        }
        missing
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
