// src/exec/resources.rs

//! Process-wide exclusive resources.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::locks::recover;

/// One single-permit semaphore per resource name.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocks {
    semaphores: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

/// Permits held for the duration of one node's action.
#[derive(Debug)]
pub struct ResourceGuard {
    _permits: Vec<OwnedSemaphorePermit>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn semaphore(&self, name: &str) -> Arc<Semaphore> {
        let mut semaphores = recover(self.semaphores.lock());
        Arc::clone(
            semaphores
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(1))),
        )
    }

    /// Acquire every named resource, always in lexicographic order so two
    /// nodes sharing resources can never wait on each other in a cycle.
    pub async fn acquire(&self, names: &[String]) -> Result<ResourceGuard, AcquireError> {
        let mut sorted: Vec<&str> = names.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut permits = Vec::with_capacity(sorted.len());
        for name in sorted {
            debug!(resource = name, "acquiring exclusive resource");
            permits.push(self.semaphore(name).acquire_owned().await?);
        }
        Ok(ResourceGuard { _permits: permits })
    }

    /// Whether `name` is currently held by some node.
    pub fn is_held(&self, name: &str) -> bool {
        self.semaphore(name).available_permits() == 0
    }
}
