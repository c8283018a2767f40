//! In-memory registry for embedding and tests.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StorageError;
use crate::registry::{SiteRegistry, Target};

/// Registry held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    targets: Mutex<Vec<Target>>,
    saves: Mutex<usize>,
}

impl MemoryRegistry {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets: Mutex::new(targets),
            saves: Mutex::new(0),
        }
    }

    /// Current contents.
    pub fn snapshot(&self) -> Vec<Target> {
        lock(&self.targets).clone()
    }

    /// Replace the contents, as an external editor of the registry would.
    pub fn replace(&self, targets: Vec<Target>) {
        *lock(&self.targets) = targets;
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        *lock(&self.saves)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl SiteRegistry for MemoryRegistry {
    async fn try_load(&self) -> Result<Vec<Target>, StorageError> {
        Ok(self.snapshot())
    }

    async fn save(&self, targets: &[Target]) -> Result<(), StorageError> {
        *lock(&self.targets) = targets.to_vec();
        *lock(&self.saves) += 1;
        Ok(())
    }
}
