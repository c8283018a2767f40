//! JSON file registry with atomic replacement.
//!
//! # Write path
//! ```text
//! serialize → <path>.tmp (fsync) → copy <path> to <path>.bak → rename .tmp over <path>
//! ```
//! A reader of `<path>` sees either the old or the new list, never a partial one.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, StorageError};
use crate::registry::target::Target;
use crate::registry::{normalize_url, SiteRegistry};

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    sites: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct RegistryFileRef<'a> {
    sites: &'a [Target],
}

/// Target list persisted as `{"sites": [...]}`.
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    path: PathBuf,
    keep_backup: bool,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>, keep_backup: bool) -> Self {
        Self {
            path: path.into(),
            keep_backup,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(&config.path, config.keep_backup)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, "bak")
    }

    /// Add a target. The URL gains a scheme if it lacks one and must not
    /// already be registered.
    pub async fn register(
        &self,
        url: &str,
        email: &str,
        name: Option<&str>,
    ) -> Result<Target, RegistryError> {
        let url = normalize_url(url)?;
        let mut targets = self.try_load().await?;
        if targets.iter().any(|t| same_site(&t.url, &url)) {
            return Err(RegistryError::Duplicate(url));
        }

        let mut target = Target::new(&url, email.trim());
        target.name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&url)
            .to_string();
        target.created_at = Some(Utc::now());

        targets.push(target.clone());
        self.save(&targets).await?;
        tracing::info!(url = %target.url, name = %target.name, "Target registered");
        Ok(target)
    }

    /// Remove the target with this URL.
    pub async fn unregister(&self, url: &str) -> Result<Target, RegistryError> {
        let url = normalize_url(url)?;
        let mut targets = self.try_load().await?;
        let index = targets
            .iter()
            .position(|t| same_site(&t.url, &url))
            .ok_or_else(|| RegistryError::NotFound(url.clone()))?;

        let removed = targets.remove(index);
        self.save(&targets).await?;
        tracing::info!(url = %removed.url, "Target removed");
        Ok(removed)
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// Stored URLs may predate normalization, so both sides are compared normalized.
fn same_site(stored: &str, normalized: &str) -> bool {
    stored == normalized || normalize_url(stored).is_ok_and(|u| u == normalized)
}

#[async_trait]
impl SiteRegistry for JsonFileRegistry {
    async fn try_load(&self) -> Result<Vec<Target>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let file: RegistryFile = serde_json::from_str(&content)?;
        let mut targets = Vec::with_capacity(file.sites.len());
        for (index, raw) in file.sites.into_iter().enumerate() {
            match serde_json::from_value::<Target>(raw) {
                Ok(target) => targets.push(target),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping malformed registry entry");
                }
            }
        }
        Ok(targets)
    }

    async fn save(&self, targets: &[Target]) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(&RegistryFileRef { sites: targets })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let tmp = with_suffix(&self.path, "tmp");
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(&body).await.map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(file);

        if self.keep_backup && tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::copy(&self.path, self.backup_path()).await {
                tracing::warn!(error = %e, "Could not rotate registry backup");
            }
        }

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), targets = targets.len(), "Registry saved");
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
