// src/locks.rs

//! Per-key mutual exclusion for on-disk stores.

use std::collections::HashMap;
use std::sync::{Arc, LockResult, Mutex, MutexGuard};

type LockMap = HashMap<String, Arc<Mutex<()>>>;

/// Hands out one lock per key; writers of different keys never contend.
///
/// A key's entry only lives while someone holds or waits for it, so the map
/// stays as small as the number of concurrent writers.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<LockMap>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = recover(self.locks.lock());
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        // Declared first so it drops after `_guard` releases the key lock.
        let entry = KeyEntry {
            map: &self.locks,
            key,
            lock,
        };
        let _guard = recover(entry.lock.lock());
        f()
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        recover(self.locks.lock()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes the key from the map when the last user lets go of it.
struct KeyEntry<'a> {
    map: &'a Mutex<LockMap>,
    key: &'a str,
    lock: Arc<Mutex<()>>,
}

impl Drop for KeyEntry<'_> {
    fn drop(&mut self) {
        let mut locks = recover(self.map.lock());
        // New handles are only cloned under the map lock, so the count is stable here.
        let unused = locks
            .get(self.key)
            .is_some_and(|held| Arc::ptr_eq(held, &self.lock) && Arc::strong_count(held) == 2);
        if unused {
            locks.remove(self.key);
        }
    }
}

/// A poisoned lock only means another holder panicked; every map guarded
/// this way is updated in a single insert or remove, so it is never left
/// half-written.
pub(crate) fn recover<'a, T>(result: LockResult<MutexGuard<'a, T>>) -> MutexGuard<'a, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

