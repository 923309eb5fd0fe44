// src/cache/mod.rs

//! Content-addressable build cache.
//!
//! - [`key`] derives cache keys from input fingerprints.
//! - [`entry`] packs output roots into a single self-describing blob.
//! - [`local`] stores entries in a sharded directory with LRU eviction.
//! - [`remote`] wraps a pluggable backend with retries and degradation.
//! - [`store`] combines both behind one load/store interface.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod entry;
pub mod key;
pub mod local;
pub mod remote;
pub mod store;

pub use entry::{CacheEntry, EntryOrigin, Manifest};
pub use key::{CacheKey, CacheKeyBuilder};
pub use local::{CacheStats, EvictionStats, LocalCacheStore};
pub use remote::{DirectoryRemoteBackend, RemoteCache, RemoteCacheBackend, RetryPolicy};
pub use store::BuildCacheStore;

/// Cache errors. None of these ever fail a build.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("cache entry has no output named '{0}'")]
    UnknownRoot(String),

    #[error("no destination given for cached output '{0}'")]
    MissingDestination(String),

    #[error("remote cache {backend} failed: {message}")]
    Remote { backend: String, message: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
