// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::RetryPolicy;
use crate::config::model::{
    BuildSettings, CacheSettings, EngineConfig, HistorySettings, LocalCacheSettings,
    RawBuildSection, RawCacheSection, RawEngineConfig, RawHistorySection, RemoteCacheSettings,
};
use crate::engine::default_parallelism;
use crate::errors::{KilnError, Result};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = KilnError;

    fn try_from(raw: RawEngineConfig) -> std::result::Result<Self, Self::Error> {
        let build = validate_build(&raw.build)?;
        let history = validate_history(&raw.history)?;
        let cache = validate_cache(&raw.cache)?;
        Ok(EngineConfig::new_unchecked(build, history, cache))
    }
}

fn validate_build(build: &RawBuildSection) -> Result<BuildSettings> {
    let max_parallelism = match build.max_parallelism {
        Some(0) => {
            return Err(KilnError::Config(
                "[build].max_parallelism must be >= 1 (got 0)".to_string(),
            ));
        }
        Some(n) => n,
        None => default_parallelism(),
    };

    for task in &build.force_rerun {
        if task.trim().is_empty() {
            return Err(KilnError::Config(
                "[build].force_rerun contains an empty task path".to_string(),
            ));
        }
    }

    Ok(BuildSettings {
        max_parallelism,
        failure_policy: build.failure_policy,
        force_rerun: build.force_rerun.clone(),
    })
}

fn validate_history(history: &RawHistorySection) -> Result<HistorySettings> {
    Ok(HistorySettings {
        storage: history.storage,
        dir: non_empty_dir("[history].dir", &history.dir)?,
    })
}

fn validate_cache(cache: &RawCacheSection) -> Result<CacheSettings> {
    if !cache.enabled {
        return Ok(CacheSettings {
            local: None,
            remote: None,
        });
    }

    let local = if cache.local.enabled {
        if cache.local.max_size == Some(0) {
            return Err(KilnError::Config(
                "[cache.local].max_size must be > 0 when set".to_string(),
            ));
        }
        Some(LocalCacheSettings {
            dir: non_empty_dir("[cache.local].dir", &cache.local.dir)?,
            max_size: cache.local.max_size,
            max_age: cache
                .local
                .max_age_days
                .map(|days| Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY))),
        })
    } else {
        None
    };

    let remote = match &cache.remote {
        None => None,
        Some(remote) => {
            if remote.max_attempts == 0 {
                return Err(KilnError::Config(
                    "[cache.remote].max_attempts must be >= 1 (got 0)".to_string(),
                ));
            }
            if remote.initial_backoff_ms > remote.max_backoff_ms {
                return Err(KilnError::Config(format!(
                    "[cache.remote].initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                    remote.initial_backoff_ms, remote.max_backoff_ms
                )));
            }
            Some(RemoteCacheSettings {
                dir: non_empty_dir("[cache.remote].dir", &remote.dir)?,
                push: remote.push,
                retry: RetryPolicy {
                    max_attempts: remote.max_attempts,
                    initial_backoff: Duration::from_millis(remote.initial_backoff_ms),
                    max_backoff: Duration::from_millis(remote.max_backoff_ms),
                },
            })
        }
    };

    Ok(CacheSettings { local, remote })
}

fn non_empty_dir(field: &str, value: &str) -> Result<PathBuf> {
    if value.trim().is_empty() {
        return Err(KilnError::Config(format!("{field} must not be empty")));
    }
    Ok(PathBuf::from(value))
}
