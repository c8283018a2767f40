//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::WatcherConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load the optional TOML file, apply environment overrides, validate.
pub fn load_config(path: Option<&Path>) -> Result<WatcherConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => WatcherConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment settings on top of file values.
///
/// Empty variables are ignored so an unset `.env` entry does not erase a file value.
pub fn apply_env_overrides<F>(config: &mut WatcherConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("CHECK_INTERVAL") {
        config.monitor.interval_secs = parse_env("CHECK_INTERVAL", &v)?;
    }
    if let Some(v) = get("FETCH_TIMEOUT") {
        config.monitor.fetch_timeout_secs = parse_env("FETCH_TIMEOUT", &v)?;
    }
    if let Some(v) = get("MAX_CONCURRENT_FETCHES") {
        config.monitor.max_concurrent_fetches = parse_env("MAX_CONCURRENT_FETCHES", &v)?;
    }
    if let Some(v) = get("WATCHDOG_INTERVAL") {
        config.monitor.watchdog_interval_secs = parse_env("WATCHDOG_INTERVAL", &v)?;
    }
    if let Some(v) = get("SMTP_SERVER") {
        config.smtp.server = v;
    }
    if let Some(v) = get("SMTP_PORT") {
        config.smtp.port = parse_env("SMTP_PORT", &v)?;
    }
    if let Some(v) = get("SMTP_USERNAME") {
        config.smtp.username = v;
    }
    if let Some(v) = get("SMTP_PASSWORD") {
        config.smtp.password = v;
    }
    if let Some(v) = get("FROM_EMAIL") {
        config.smtp.from_email = v;
    }
    if let Some(v) = get("WATCHER_REGISTRY_PATH") {
        config.registry.path = v;
    }
    if let Some(v) = get("WATCHER_LOG_LEVEL") {
        config.observability.log_level = v;
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}
