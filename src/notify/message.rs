//! Notification text.

use chrono::{DateTime, Utc};

use crate::registry::Target;

/// Subject and plain-text body of one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub subject: String,
    pub body: String,
}

/// Notice sent when a target's fingerprint changed.
pub fn change_notice(target: &Target, detected_at: DateTime<Utc>) -> Notice {
    let name = target.display_name();
    Notice {
        subject: format!("Site updated: {name}"),
        body: format!(
            "A monitored site has changed.\n\n\
             Site: {name}\n\
             URL: {url}\n\
             Detected at: {time}\n\n\
             This message was sent automatically by site-watcher.\n",
            url = target.url,
            time = detected_at.format("%Y-%m-%d %H:%M:%S UTC"),
        ),
    }
}

/// Notice used to confirm mail delivery works.
pub fn test_notice(sent_at: DateTime<Utc>) -> Notice {
    Notice {
        subject: "site-watcher test message".to_string(),
        body: format!(
            "This is a test message from site-watcher.\n\n\
             Sent at: {}\n\n\
             If you received it, mail delivery is configured correctly.\n",
            sent_at.format("%Y-%m-%d %H:%M:%S UTC"),
        ),
    }
}
