//! Shared utilities for integration testing.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;

use site_watcher::config::WatcherConfig;
use site_watcher::error::{FetchError, FetchErrorKind, StorageError, TransportError};
use site_watcher::fetch::{Fingerprint, Fingerprinter};
use site_watcher::monitor::Engine;
use site_watcher::notify::{MailTransport, Notifier, OutgoingMail};
use site_watcher::observability::EngineMetrics;
use site_watcher::registry::{MemoryRegistry, SiteRegistry, Target};

/// Canned HTTP response for the mock backend.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay: Duration,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok("")
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            headers: vec![("Location".to_string(), location.to_string())],
            ..Self::status(302)
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Request line path and headers as seen by the mock backend.
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    pub path: String,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
}

impl MockRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(MockRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        let response = f(request).await;
                        tokio::time::sleep(response.delay).await;

                        let status_text = match response.status {
                            200 => "200 OK",
                            302 => "302 Found",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let extra: String = response
                            .headers
                            .iter()
                            .map(|(k, v)| format!("{k}: {v}\r\n"))
                            .collect();

                        let response_str = format!(
                            "HTTP/1.1 {}\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            extra,
                            response.body.len(),
                            response.body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock backend that always returns the same body.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { MockResponse::ok(body) }).await
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> MockRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.split("\r\n");
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    MockRequest { path, headers }
}

/// Scripted behaviour for one URL in [`StubFingerprinter`].
#[derive(Debug, Clone)]
pub enum Script {
    Hash(String),
    Fail,
    Hang,
    Panic,
}

/// Fingerprinter driven by a per-URL script, with in-flight instrumentation.
pub struct StubFingerprinter {
    scripts: Mutex<HashMap<String, Script>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubFingerprinter {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    pub fn hash(&self, url: &str, hash: &str) {
        self.script(url, Script::Hash(hash.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fingerprinter for StubFingerprinter {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Fingerprint, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let script = self.scripts.lock().unwrap().get(url).cloned();
        tokio::time::sleep(self.delay).await;

        match script {
            Some(Script::Hash(hash)) => Ok(Fingerprint {
                hash,
                elapsed: self.delay,
            }),
            Some(Script::Hang) => {
                tokio::time::sleep(timeout * 10).await;
                Err(FetchError::new(url, FetchErrorKind::Timeout(timeout)))
            }
            Some(Script::Panic) => panic!("corrupt record for {url}"),
            Some(Script::Fail) | None => Err(FetchError::new(url, FetchErrorKind::Status(500))),
        }
    }
}

/// Transport that records deliveries and can be switched to fail.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMail>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Smtp("451 temporary failure".into()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// Memory registry whose loads/saves can be made to misbehave.
#[derive(Default)]
pub struct FaultyRegistry {
    pub inner: MemoryRegistry,
    fail_saves: AtomicBool,
    panicking_loads: AtomicUsize,
    loads: Mutex<Vec<Instant>>,
}

impl FaultyRegistry {
    pub fn new(targets: Vec<Target>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryRegistry::new(targets),
            ..Self::default()
        })
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// The next `n` loads panic.
    pub fn panic_on_loads(&self, n: usize) {
        self.panicking_loads.store(n, Ordering::SeqCst);
    }

    /// When each round-start load happened.
    pub fn load_times(&self) -> Vec<Instant> {
        self.loads.lock().unwrap().clone()
    }
}

#[async_trait]
impl SiteRegistry for FaultyRegistry {
    async fn try_load(&self) -> Result<Vec<Target>, StorageError> {
        self.inner.try_load().await
    }

    async fn save(&self, targets: &[Target]) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                path: "memory".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.save(targets).await
    }

    async fn load(&self) -> Vec<Target> {
        self.loads.lock().unwrap().push(Instant::now());
        let remaining = self.panicking_loads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.panicking_loads.store(remaining - 1, Ordering::SeqCst);
            panic!("registry invariant violated");
        }
        self.inner.load().await
    }
}

/// Defaults with SMTP credentials filled in so nothing degrades.
pub fn test_config() -> WatcherConfig {
    let mut config = WatcherConfig::default();
    config.smtp.username = "watcher@example.com".to_string();
    config.smtp.password = "secret".to_string();
    config.smtp.from_email = "watcher@example.com".to_string();
    config
}

pub fn target(url: &str, hash: &str) -> Target {
    Target::new(url, "owner@example.com")
        .with_name(url)
        .with_hash(hash)
}

/// Engine over the given collaborators with a fresh metrics holder.
pub fn engine(
    config: &WatcherConfig,
    registry: Arc<dyn SiteRegistry>,
    fetcher: Arc<dyn Fingerprinter>,
    transport: Arc<dyn MailTransport>,
) -> (Arc<Engine>, Arc<EngineMetrics>) {
    let metrics = Arc::new(EngineMetrics::new());
    let notifier = Arc::new(Notifier::from_config(transport, config, metrics.clone()));
    let engine = Arc::new(Engine::new(registry, fetcher, notifier, config, metrics.clone()));
    (engine, metrics)
}
