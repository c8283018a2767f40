//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Fetch of one target:
//!     → circuit_breaker.rs (per-URL breaker from the BreakerTable admits or fails fast)
//!     → timeouts.rs (adaptive deadline for this URL)
//!     → outcome recorded on the breaker; response time fed back into timeouts.rs
//!
//! Notification:
//!     → circuit_breaker.rs (shared mail breaker)
//!     → retries.rs + backoff.rs (bounded attempts, doubling delays)
//!
//! Supervisor loop fault:
//!     → backoff.rs (min(60s * 2^n, 1h))
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - The fetch primitive never retries; retry policy lives with the caller
//! - Breakers are isolated per protected resource, never global

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, BreakerSettings, BreakerTable, CircuitBreaker, CircuitState};
pub use retries::RetryPolicy;
pub use timeouts::AdaptiveTimeouts;
