// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::RetryPolicy;
use crate::engine::BuildOptions;
use crate::types::{FailurePolicy, HistoryStorageMode};

/// Engine settings as read from a TOML file.
///
/// ```toml
/// [build]
/// max_parallelism = 8
/// failure_policy = "continue"
///
/// [history]
/// dir = ".kiln/history"
///
/// [cache.local]
/// dir = ".kiln/cache"
/// max_age_days = 7
///
/// [cache.remote]
/// dir = "/mnt/shared/kiln-cache"
/// push = true
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEngineConfig {
    #[serde(default)]
    pub build: RawBuildSection,

    #[serde(default)]
    pub history: RawHistorySection,

    #[serde(default)]
    pub cache: RawCacheSection,
}

/// `[build]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBuildSection {
    /// Defaults to the number of available CPUs.
    #[serde(default)]
    pub max_parallelism: Option<usize>,

    /// `"fail-fast"` (default) or `"continue"`.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Task paths that always execute.
    #[serde(default)]
    pub force_rerun: Vec<String>,
}

/// `[history]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawHistorySection {
    #[serde(default)]
    pub storage: HistoryStorageMode,

    #[serde(default = "default_history_dir")]
    pub dir: String,
}

fn default_history_dir() -> String {
    ".kiln/history".to_string()
}

impl Default for RawHistorySection {
    fn default() -> Self {
        Self {
            storage: HistoryStorageMode::default(),
            dir: default_history_dir(),
        }
    }
}

/// `[cache]` section with its `[cache.local]` / `[cache.remote]` tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCacheSection {
    /// Master switch; `false` disables both local and remote caches.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub local: RawLocalCacheSection,

    #[serde(default)]
    pub remote: Option<RawRemoteCacheSection>,
}

impl Default for RawCacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            local: RawLocalCacheSection::default(),
            remote: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLocalCacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_dir")]
    pub dir: String,

    /// Size limit in bytes enforced by eviction.
    #[serde(default)]
    pub max_size: Option<u64>,

    /// Entries not used for this many days are evicted.
    #[serde(default)]
    pub max_age_days: Option<u64>,
}

impl Default for RawLocalCacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
            max_size: None,
            max_age_days: None,
        }
    }
}

fn default_cache_dir() -> String {
    ".kiln/cache".to_string()
}

fn default_true() -> bool {
    true
}

/// `[cache.remote]`: a shared directory acting as the remote cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRemoteCacheSection {
    pub dir: String,

    /// Pull-only when `false`.
    #[serde(default)]
    pub push: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    RetryPolicy::default().max_attempts
}

fn default_initial_backoff_ms() -> u64 {
    RetryPolicy::default().initial_backoff.as_millis() as u64
}

fn default_max_backoff_ms() -> u64 {
    RetryPolicy::default().max_backoff.as_millis() as u64
}

/// Validated engine settings.
///
/// Construct via `EngineConfig::try_from(raw)` (see `validate.rs`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub build: BuildSettings,
    pub history: HistorySettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub max_parallelism: usize,
    pub failure_policy: FailurePolicy,
    pub force_rerun: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySettings {
    pub storage: HistoryStorageMode,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// `None` when the local cache is disabled.
    pub local: Option<LocalCacheSettings>,
    /// `None` when no remote is configured or caching is disabled.
    pub remote: Option<RemoteCacheSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCacheSettings {
    pub dir: PathBuf,
    pub max_size: Option<u64>,
    pub max_age: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCacheSettings {
    pub dir: PathBuf,
    pub push: bool,
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Internal constructor used by the validation layer.
    pub(crate) fn new_unchecked(
        build: BuildSettings,
        history: HistorySettings,
        cache: CacheSettings,
    ) -> Self {
        Self {
            build,
            history,
            cache,
        }
    }

    /// Resolve relative directories against `base` (usually the directory
    /// holding the settings file).
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.history.dir);
        if let Some(local) = &mut self.cache.local {
            resolve(&mut local.dir);
        }
        if let Some(remote) = &mut self.cache.remote {
            resolve(&mut remote.dir);
        }
        self
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            max_parallelism: self.build.max_parallelism,
            failure_policy: self.build.failure_policy,
            force_rerun: self.build.force_rerun.clone(),
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.local.is_some() || self.cache.remote.is_some()
    }
}

impl Default for EngineConfig {
    /// Same result as validating an empty settings file.
    fn default() -> Self {
        Self::new_unchecked(
            BuildSettings {
                max_parallelism: crate::engine::default_parallelism(),
                failure_policy: FailurePolicy::default(),
                force_rerun: Vec::new(),
            },
            HistorySettings {
                storage: HistoryStorageMode::default(),
                dir: PathBuf::from(default_history_dir()),
            },
            CacheSettings {
                local: Some(LocalCacheSettings {
                    dir: PathBuf::from(default_cache_dir()),
                    max_size: None,
                    max_age: None,
                }),
                remote: None,
            },
        )
    }
}
