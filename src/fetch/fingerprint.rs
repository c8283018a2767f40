//! HTTP content fingerprinting.
//!
//! One GET per call, browser-like headers, redirects followed, bounded by the
//! caller's timeout. No internal retries.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use std::error::Error as _;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{FetchError, FetchErrorKind};
use crate::fetch::{content_hash, Fingerprint, Fingerprinter};

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const MAX_REDIRECTS: usize = 10;

/// reqwest-backed fingerprinter sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpFingerprinter {
    client: Client,
}

impl HttpFingerprinter {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::from_builder(Client::builder())
    }

    /// Apply the browser headers and redirect policy on top of `builder`.
    pub fn from_builder(builder: ClientBuilder) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = builder
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fingerprinter for HttpFingerprinter {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Fingerprint, FetchError> {
        let started = Instant::now();

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(url, &e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(url, FetchErrorKind::Status(status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify(url, &e, timeout))?;
        let text = String::from_utf8_lossy(&body);

        let fingerprint = Fingerprint {
            hash: content_hash(&text),
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            url = %url,
            status = %status,
            bytes = body.len(),
            elapsed = ?fingerprint.elapsed,
            "Fetched target"
        );
        Ok(fingerprint)
    }
}

fn classify(url: &str, error: &reqwest::Error, timeout: Duration) -> FetchError {
    let kind = if error.is_timeout() {
        FetchErrorKind::Timeout(timeout)
    } else if error.is_builder() {
        FetchErrorKind::InvalidUrl(describe(error))
    } else if let Some(status) = error.status() {
        FetchErrorKind::Status(status.as_u16())
    } else {
        FetchErrorKind::Transport(describe(error))
    };
    FetchError::new(url, kind)
}

/// Error text including its source chain; reqwest's own message hides the cause.
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
