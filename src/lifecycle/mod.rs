//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Init logging/metrics → Verify mail transport → Spawn watchdog
//!
//! Shutdown (shutdown.rs):
//!     Signal received → supervisor stops admitting targets → round persists → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Shutdown state is level-triggered (watch channel), so no task can miss it
//! - Shutdown has a grace period; the watchdog aborts its child after it

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
