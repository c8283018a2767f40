//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (EngineMetrics atomics, mirrored to the metrics facade)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Engine::health() snapshot
//!     → Prometheus exporter (optional)
//! ```
//!
//! # Design Decisions
//! - Counters live in an explicit holder passed to each component, never in statics,
//!   so each test observes an isolated instance
//! - Metric updates are atomic increments; no lost updates under concurrent checks

pub mod logging;
pub mod metrics;

pub use metrics::{EngineMetrics, HealthSnapshot};
