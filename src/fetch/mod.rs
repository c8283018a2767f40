//! Content fingerprinting.
//!
//! # Data Flow
//! ```text
//! URL + timeout
//!     → fingerprint.rs (GET with browser headers, follow redirects)
//!     → body bytes as UTF-8 text → MD5 → 32-char lowercase hex
//! ```
//!
//! # Design Decisions
//! - The digest only has to detect change; MD5 is fast and collision-free in practice here
//! - Failures carry their cause; the caller's breaker decides what to do about them
//! - `Fingerprinter` is a trait so the poll round can run against stubs

use async_trait::async_trait;
use std::time::Duration;

use crate::error::FetchError;

pub mod fingerprint;

pub use fingerprint::HttpFingerprinter;

/// Result of one successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: String,
    /// Wall time of the request, fed back into adaptive timeouts.
    pub elapsed: Duration,
}

/// Fetches a URL and digests its content.
#[async_trait]
pub trait Fingerprinter: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Fingerprint, FetchError>;
}

/// Stable digest of page content as lowercase hex.
pub fn content_hash(body: &str) -> String {
    format!("{:x}", md5::compute(body.as_bytes()))
}
