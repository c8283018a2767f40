//! Target registry.
//!
//! # Data Flow
//! ```text
//! CLI (add / remove / list)
//!     → store.rs (JsonFileRegistry::register / unregister)
//!
//! Poll round:
//!     SiteRegistry::load  → targets to check
//!     SiteRegistry::try_load + merge_checked → SiteRegistry::save
//! ```
//!
//! # Design Decisions
//! - Identity is the URL; uniqueness is enforced on registration
//! - The engine only ever writes check state back; it never adds or deletes targets
//! - A failed load is a quiet "no targets" for the engine, loud in the logs

use async_trait::async_trait;
use url::Url;

use crate::error::{RegistryError, StorageError};

pub mod memory;
pub mod store;
pub mod target;

pub use memory::MemoryRegistry;
pub use store::JsonFileRegistry;
pub use target::Target;

/// Durable target list, seen by the engine as a load/save pair.
#[async_trait]
pub trait SiteRegistry: Send + Sync {
    /// Read the current list, reporting storage failures.
    async fn try_load(&self) -> Result<Vec<Target>, StorageError>;

    /// Persist the full list; readers must never observe a partial write.
    async fn save(&self, targets: &[Target]) -> Result<(), StorageError>;

    /// Read the current list; a storage failure yields no targets.
    async fn load(&self) -> Vec<Target> {
        match self.try_load().await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load target registry, continuing with no targets");
                Vec::new()
            }
        }
    }
}

/// Ensure `raw` carries an http(s) scheme and parses as a URL.
pub fn normalize_url(raw: &str) -> Result<String, RegistryError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let invalid = |reason: String| RegistryError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let parsed = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(parsed.to_string())
}

/// Apply a round's results to the registry's current list.
///
/// Targets registered during the round are kept untouched; targets deleted
/// during the round stay deleted.
pub fn merge_checked(mut current: Vec<Target>, checked: &[Target]) -> Vec<Target> {
    for target in &mut current {
        if let Some(result) = checked.iter().find(|c| c.url == target.url) {
            target.absorb_check_state(result);
        }
    }
    current
}
