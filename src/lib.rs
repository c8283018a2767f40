//! Site watcher library: periodic change detection with e-mail notification.

pub mod config;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod monitor;
pub mod notify;
pub mod observability;
pub mod registry;
pub mod resilience;

pub use config::schema::WatcherConfig;
pub use lifecycle::Shutdown;
pub use monitor::{Engine, MonitorSupervisor, RoundSummary};
