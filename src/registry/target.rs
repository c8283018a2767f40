//! The monitored target record.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One monitored URL/recipient pair with its last-known fingerprint.
///
/// Field names on disk (`hash`, `last_check`, `last_notified`) match the
/// registry files written by earlier deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Identity of the target; always carries a scheme.
    pub url: String,

    /// Notification recipient.
    #[serde(default)]
    pub email: String,

    /// Display label; empty means "use the URL".
    #[serde(default)]
    pub name: String,

    /// Last observed fingerprint, empty until the first successful check.
    #[serde(rename = "hash", default)]
    pub content_hash: String,

    #[serde(
        rename = "last_check",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_checked_at: Option<DateTime<Utc>>,

    #[serde(
        rename = "last_notified",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_notified_at: Option<DateTime<Utc>>,

    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,

    /// Consecutive rounds whose change notification could not be delivered.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub notify_failures: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Target {
    pub fn new(url: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            email: email.into(),
            name: String::new(),
            content_hash: String::new(),
            last_checked_at: None,
            last_notified_at: None,
            created_at: None,
            notify_failures: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = hash.into();
        self
    }

    /// Label for logs and notifications.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.url
        } else {
            &self.name
        }
    }

    /// True until the first successful fingerprint has been stored.
    pub fn is_unseen(&self) -> bool {
        self.content_hash.is_empty()
    }

    /// Copy the fields the engine owns from `checked`, keeping the
    /// registration fields (email, name, created_at) of `self`.
    pub fn absorb_check_state(&mut self, checked: &Target) {
        self.content_hash.clone_from(&checked.content_hash);
        self.last_checked_at = checked.last_checked_at;
        self.last_notified_at = checked.last_notified_at;
        self.notify_failures = checked.notify_failures;
    }
}

/// Accept RFC 3339, naive ISO-8601 (treated as UTC), or garbage (→ `None`).
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(_) => {
            tracing::warn!(value = %raw, "Ignoring unparseable timestamp in registry");
            None
        }
    }
}
