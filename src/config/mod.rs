//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env (dotenvy) → process environment
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, overlay environment)
//!     → validation.rs (semantic checks)
//!     → WatcherConfig (validated, immutable)
//!     → handed by value to each component at startup
//! ```
//!
//! # Design Decisions
//! - All fields have defaults so an empty environment still starts
//! - Environment wins over the file
//! - Missing SMTP credentials degrade the notifier, they do not abort startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BreakerConfig;
pub use schema::LogFormat;
pub use schema::MonitorConfig;
pub use schema::ObservabilityConfig;
pub use schema::RegistryConfig;
pub use schema::SmtpConfig;
pub use schema::WatcherConfig;
