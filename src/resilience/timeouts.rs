//! Adaptive per-URL fetch timeouts.
//!
//! After a successful fetch the next timeout for that URL becomes
//! `clamp(response_time * 1.5, 10s, 60s)`. URLs never fetched successfully
//! use the configured default.

use dashmap::DashMap;
use std::time::Duration;

pub const ADAPTIVE_MIN: Duration = Duration::from_secs(10);
pub const ADAPTIVE_MAX: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct AdaptiveTimeouts {
    default: Duration,
    learned: DashMap<String, Duration>,
}

impl AdaptiveTimeouts {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            learned: DashMap::new(),
        }
    }

    /// Timeout to use for the next fetch of `url`.
    pub fn timeout_for(&self, url: &str) -> Duration {
        self.learned
            .get(url)
            .map(|t| *t.value())
            .unwrap_or(self.default)
    }

    /// Learn from a successful fetch that took `response_time`.
    pub fn record_success(&self, url: &str, response_time: Duration) {
        let next = response_time.mul_f64(1.5).clamp(ADAPTIVE_MIN, ADAPTIVE_MAX);
        self.learned.insert(url.to_string(), next);
    }

    /// Drop what was learned for URLs no longer monitored.
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.learned.retain(|url, _| keep(url));
    }
}
