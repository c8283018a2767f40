//! Change notification delivery.
//!
//! # Data Flow
//! ```text
//! PollRound detects a change
//!     → message.rs (compose subject/body)
//!     → notifier.rs (shared mail breaker, up to 3 attempts, 1s/2s backoff)
//!     → transport.rs (SMTP over STARTTLS, or disabled when unconfigured)
//!     → bool back to the round
//! ```
//!
//! # Design Decisions
//! - Transport errors never escape the notifier
//! - Metrics count one email per notify call, not per attempt
//! - Missing credentials fail fast without touching the breaker

pub mod message;
pub mod notifier;
pub mod transport;

pub use message::{change_notice, test_notice, Notice};
pub use notifier::Notifier;
pub use transport::{build_transport, DisabledTransport, MailTransport, OutgoingMail, SmtpMailer};
