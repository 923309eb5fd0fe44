// src/cache/store.rs

use tracing::{debug, info, warn};

use super::entry::CacheEntry;
use super::key::CacheKey;
use super::local::LocalCacheStore;
use super::remote::RemoteCache;

/// Local store plus optional remote, behind one load/store interface.
///
/// Nothing here ever fails a build: I/O problems are logged and turn into
/// misses (load) or dropped writes (store).
#[derive(Debug, Default)]
pub struct BuildCacheStore {
    local: Option<LocalCacheStore>,
    remote: Option<RemoteCache>,
}

impl BuildCacheStore {
    pub fn new(local: Option<LocalCacheStore>, remote: Option<RemoteCache>) -> Self {
        Self { local, remote }
    }

    /// A store that never hits and never writes.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.local.is_some() || self.remote.is_some()
    }

    pub fn local(&self) -> Option<&LocalCacheStore> {
        self.local.as_ref()
    }

    pub fn remote(&self) -> Option<&RemoteCache> {
        self.remote.as_ref()
    }

    /// Local first, then remote. A remote hit is written through to local.
    pub fn load(&self, key: &CacheKey) -> Option<CacheEntry> {
        if let Some(local) = &self.local {
            match local.load(key) {
                Ok(Some(bytes)) => match CacheEntry::decode(&bytes) {
                    Ok(entry) if entry.key() == *key => return Some(entry),
                    Ok(_) => {
                        warn!(key = %key, "local cache entry holds a different key; discarding");
                        local.discard(key);
                    }
                    Err(err) => {
                        warn!(key = %key, error = %err, "corrupt local cache entry; discarding");
                        local.discard(key);
                    }
                },
                Ok(None) => {}
                Err(err) => warn!(key = %key, error = %err, "local cache read failed"),
            }
        }

        let remote = self.remote.as_ref()?;
        let bytes = remote.load(key)?;
        let entry = match CacheEntry::decode(&bytes) {
            Ok(entry) if entry.key() == *key => entry,
            Ok(_) => {
                warn!(key = %key, backend = %remote.describe(), "remote cache entry holds a different key");
                return None;
            }
            Err(err) => {
                warn!(key = %key, backend = %remote.describe(), error = %err, "corrupt remote cache entry");
                return None;
            }
        };
        info!(key = %key, backend = %remote.describe(), "remote cache hit");

        if let Some(local) = &self.local {
            if let Err(err) = local.store(key, &bytes) {
                warn!(key = %key, error = %err, "failed to copy remote entry into local cache");
            }
        }
        Some(entry)
    }

    pub fn store(&self, entry: &CacheEntry) {
        if !self.is_enabled() {
            return;
        }
        let key = entry.key();
        let bytes = match entry.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to encode cache entry");
                return;
            }
        };

        if let Some(local) = &self.local {
            match local.store(&key, &bytes) {
                Ok(()) => debug!(key = %key, "stored cache entry locally"),
                Err(err) => warn!(key = %key, error = %err, "local cache write failed"),
            }
        }
        if let Some(remote) = &self.remote {
            remote.store(&key, &bytes);
        }
    }
}
