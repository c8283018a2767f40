//! Monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! Watchdog (watchdog.rs)
//!     → MonitorSupervisor (supervisor.rs): loop { round; sleep }
//!         → Engine::run_round (engine.rs): load → PollRound → merge → save
//!             → PollRound (round.rs): gate(5) → breaker → fetch → notify
//! ```
//!
//! # Design Decisions
//! - Target failures end as outcomes; only engine faults reach the supervisor
//! - Rounds are serialised by the engine, so "check now" never overlaps the loop
//! - The watchdog owns exactly one child and restarts it whenever it has finished

pub mod engine;
pub mod round;
pub mod supervisor;
pub mod watchdog;

pub use engine::Engine;
pub use round::{CheckFailure, CheckOutcome, PollRound, RoundReport, RoundSettings, RoundSummary, SkipReason};
pub use supervisor::MonitorSupervisor;
pub use watchdog::{spawn_monitoring, TaskHandle, Watchdog};
