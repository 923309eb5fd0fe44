// src/cache/local.rs

//! Local directory cache: `<dir>/<hex[..2]>/<hex>`.
//!
//! Entries are written to `<dir>/tmp/` and renamed into place, so readers
//! only ever see complete files. A load bumps the entry's modification time,
//! which is what the LRU eviction orders by.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use super::key::CacheKey;
use super::CacheError;
use crate::locks::KeyedLocks;

const TMP_DIR: &str = "tmp";

#[derive(Debug)]
pub struct LocalCacheStore {
    dir: PathBuf,
    max_size: Option<u64>,
    max_age: Option<Duration>,
    locks: KeyedLocks,
    tmp_counter: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache entries
    pub entries: usize,
    /// Total size in bytes
    pub total_size: u64,
}

impl CacheStats {
    /// Format total size in human-readable form
    pub fn formatted_size(&self) -> String {
        if self.total_size < 1024 {
            format!("{} B", self.total_size)
        } else if self.total_size < 1024 * 1024 {
            format!("{:.1} KB", self.total_size as f64 / 1024.0)
        } else if self.total_size < 1024 * 1024 * 1024 {
            format!("{:.1} MB", self.total_size as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", self.total_size as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }
}

/// Statistics from an eviction pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionStats {
    pub removed_expired: usize,
    pub removed_for_size: usize,
    pub freed_bytes: u64,
    pub kept: usize,
}

#[derive(Debug)]
struct StoredEntry {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

impl LocalCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_size: None,
            max_age: None,
            locks: KeyedLocks::new(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn with_max_size(mut self, bytes: Option<u64>) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn with_max_age(mut self, age: Option<Duration>) -> Self {
        self.max_age = age;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let hex = key.to_hex();
        self.dir.join(&hex[..2]).join(hex)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entry_path(key).is_file()
    }

    /// Raw bytes of an entry, or `None` on a miss.
    pub fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(key = %key, "local cache miss");
                return Ok(None);
            }
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        if let Err(err) = touch(&path) {
            debug!(key = %key, error = %err, "could not bump cache entry access time");
        }
        debug!(key = %key, bytes = bytes.len(), "local cache hit");
        Ok(Some(bytes))
    }

    /// Delete an entry that failed to decode.
    pub fn discard(&self, key: &CacheKey) {
        let path = self.entry_path(key);
        self.locks.with_lock(&key.to_hex(), || {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(key = %key, error = %e, "failed to remove corrupt cache entry");
                }
            }
        });
    }

    /// Write an entry atomically. Concurrent writers of one key converge on
    /// one complete file.
    pub fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        let target = self.entry_path(key);
        self.locks.with_lock(&key.to_hex(), || {
            let tmp_dir = self.dir.join(TMP_DIR);
            fs::create_dir_all(&tmp_dir).map_err(|e| CacheError::io(&tmp_dir, e))?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
            }

            let tmp = tmp_dir.join(format!(
                "{}.{}.{}.partial",
                key.to_hex(),
                std::process::id(),
                self.tmp_counter.fetch_add(1, Ordering::Relaxed)
            ));
            let written = write_synced(&tmp, bytes).and_then(|()| fs::rename(&tmp, &target));
            if let Err(e) = written {
                let _ = fs::remove_file(&tmp);
                return Err(CacheError::io(&target, e));
            }
            debug!(key = %key, bytes = bytes.len(), "stored local cache entry");
            Ok(())
        })?;

        if self.max_size.is_some() || self.max_age.is_some() {
            self.evict()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self.list_entries()?;
        Ok(CacheStats {
            entries: entries.len(),
            total_size: entries.iter().map(|e| e.size).sum(),
        })
    }

    /// Remove entries older than `max_age`, then least-recently-used entries
    /// until the total size fits `max_size`.
    pub fn evict(&self) -> Result<EvictionStats, CacheError> {
        let mut stats = EvictionStats::default();
        let mut entries = self.list_entries()?;
        entries.sort_by_key(|e| e.modified);

        let now = SystemTime::now();
        let mut remaining = Vec::with_capacity(entries.len());
        for entry in entries {
            let expired = self.max_age.is_some_and(|max_age| {
                now.duration_since(entry.modified).unwrap_or_default() > max_age
            });
            if expired && remove_entry(&entry.path) {
                stats.removed_expired += 1;
                stats.freed_bytes += entry.size;
            } else {
                remaining.push(entry);
            }
        }

        if let Some(max_size) = self.max_size {
            let mut total: u64 = remaining.iter().map(|e| e.size).sum();
            let mut kept = Vec::with_capacity(remaining.len());
            for entry in remaining {
                if total > max_size && remove_entry(&entry.path) {
                    total -= entry.size;
                    stats.removed_for_size += 1;
                    stats.freed_bytes += entry.size;
                } else {
                    kept.push(entry);
                }
            }
            remaining = kept;
        }

        stats.kept = remaining.len();
        if stats.removed_expired + stats.removed_for_size > 0 {
            info!(
                expired = stats.removed_expired,
                over_size = stats.removed_for_size,
                freed_bytes = stats.freed_bytes,
                kept = stats.kept,
                "evicted local cache entries"
            );
        }
        Ok(stats)
    }

    fn list_entries(&self) -> Result<Vec<StoredEntry>, CacheError> {
        let mut entries = Vec::new();
        let shards = match fs::read_dir(&self.dir) {
            Ok(shards) => shards,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };

        for shard in shards {
            let shard = shard.map_err(|e| CacheError::io(&self.dir, e))?;
            let shard_path = shard.path();
            if shard.file_name() == TMP_DIR || !shard_path.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&shard_path).map_err(|e| CacheError::io(&shard_path, e))? {
                let entry = entry.map_err(|e| CacheError::io(&shard_path, e))?;
                let meta = entry.metadata().map_err(|e| CacheError::io(entry.path(), e))?;
                if !meta.is_file() {
                    continue;
                }
                entries.push(StoredEntry {
                    path: entry.path(),
                    size: meta.len(),
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                });
            }
        }
        Ok(entries)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn touch(path: &Path) -> io::Result<()> {
    File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

fn remove_entry(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = ?path, error = %e, "failed to evict cache entry");
            false
        }
    }
}
