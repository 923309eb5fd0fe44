// src/cache/remote.rs

//! Remote cache backends and the retrying wrapper around them.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::key::CacheKey;
use super::CacheError;

/// Distinguishes concurrent uploads of the same key from this process.
static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Content-addressable GET/PUT by cache key.
///
/// Any transport works as long as `load` returns exactly the bytes a
/// previous `store` wrote for the same key.
pub trait RemoteCacheBackend: Send + Sync {
    /// Human-readable location, used in logs.
    fn describe(&self) -> String;

    fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    fn store(&self, key: &CacheKey, data: &[u8]) -> Result<(), CacheError>;
}

/// Remote cache on a shared directory (network mount, synced folder).
///
/// The directory must already exist; a missing directory is reported as an
/// unreachable backend rather than created.
#[derive(Debug, Clone)]
pub struct DirectoryRemoteBackend {
    dir: PathBuf,
}

impl DirectoryRemoteBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn check_reachable(&self) -> Result<(), CacheError> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(CacheError::Remote {
                backend: self.describe(),
                message: "directory is not reachable".to_string(),
            })
        }
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.to_hex())
    }
}

impl RemoteCacheBackend for DirectoryRemoteBackend {
    fn describe(&self) -> String {
        format!("dir:{}", self.dir.display())
    }

    fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        self.check_reachable()?;
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    fn store(&self, key: &CacheKey, data: &[u8]) -> Result<(), CacheError> {
        self.check_reachable()?;
        let target = self.entry_path(key);
        let tmp = self.dir.join(format!(
            ".{}.{}.{}.partial",
            key.to_hex(),
            std::process::id(),
            UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let result = File::create(&tmp)
            .and_then(|mut f| f.write_all(data).and_then(|()| f.sync_all()))
            .and_then(|()| fs::rename(&tmp, &target));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io(target, e));
        }
        Ok(())
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// A backend plus retry, push mode and build-wide degradation.
///
/// After an operation fails `max_attempts` times the remote is disabled for
/// the rest of the build; every later call is a no-op miss.
pub struct RemoteCache {
    backend: Box<dyn RemoteCacheBackend>,
    policy: RetryPolicy,
    push: bool,
    disabled: AtomicBool,
}

impl std::fmt::Debug for RemoteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCache")
            .field("backend", &self.backend.describe())
            .field("policy", &self.policy)
            .field("push", &self.push)
            .field("disabled", &self.is_disabled())
            .finish()
    }
}

impl RemoteCache {
    pub fn new(backend: Box<dyn RemoteCacheBackend>, policy: RetryPolicy, push: bool) -> Self {
        Self {
            backend,
            policy,
            push,
            disabled: AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub fn push_enabled(&self) -> bool {
        self.push
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    pub fn load(&self, key: &CacheKey) -> Option<Vec<u8>> {
        if self.is_disabled() {
            return None;
        }
        self.with_retry("load", key, || self.backend.load(key))
            .flatten()
    }

    /// No-op in pull-only mode.
    pub fn store(&self, key: &CacheKey, data: &[u8]) {
        if !self.push || self.is_disabled() {
            return;
        }
        if self.with_retry("store", key, || self.backend.store(key, data)).is_some() {
            debug!(key = %key, backend = %self.backend.describe(), "pushed entry to remote cache");
        }
    }

    fn with_retry<T>(
        &self,
        op: &str,
        key: &CacheKey,
        mut f: impl FnMut() -> Result<T, CacheError>,
    ) -> Option<T> {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Some(value),
                Err(err) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    debug!(
                        op,
                        key = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "remote cache operation failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    if !self.disabled.swap(true, Ordering::SeqCst) {
                        warn!(
                            op,
                            backend = %self.backend.describe(),
                            attempts = attempt,
                            error = %err,
                            "remote cache unavailable; continuing with local cache only"
                        );
                    }
                    return None;
                }
            }
        }
    }
}
