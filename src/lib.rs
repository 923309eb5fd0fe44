// src/lib.rs

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod history;
pub mod locks;
pub mod logging;
pub mod report;
pub mod snapshot;
pub mod types;
pub mod uptodate;

use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::{debug, info};

pub use crate::build::Engine;
pub use crate::dag::{NodeState, PropertyDescriptor, TaskGraph, TaskNode};
pub use crate::engine::BuildOptions;
pub use crate::errors::KilnError;
pub use crate::exec::{Action, ActionContext, Cancellation, CommandAction, FnAction};
pub use crate::report::BuildResult;

use crate::build::cache_from_config;
use crate::cli::{CacheCommand, CliArgs, Command, ConfigCommand, HistoryCommand};
use crate::config::{default_config_path, load_and_validate, EngineConfig};
use crate::history::{FileHistoryStore, HistoryStore};
use crate::types::HistoryStorageMode;

/// High-level entry point used by `main.rs`.
///
/// Loads the settings, then runs one maintenance command against the stores
/// they describe.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_settings(args.config.as_deref())?;

    match args.command {
        Command::Cache { action } => run_cache_command(&cfg, action),
        Command::History { action } => run_history_command(&cfg, action),
        Command::Config {
            action: ConfigCommand::Check,
        } => {
            print_config(&cfg);
            Ok(())
        }
    }
}

/// An explicit path must exist; the default path falls back to defaults.
fn load_settings(explicit: Option<&str>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return Ok(load_and_validate(path)?);
    }
    let path = default_config_path();
    if path.exists() {
        return Ok(load_and_validate(&path)?);
    }
    info!(path = %path.display(), "no settings file; using defaults");
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    Ok(EngineConfig::default().resolve_paths(&cwd))
}

fn run_cache_command(cfg: &EngineConfig, action: CacheCommand) -> Result<()> {
    let cache = cache_from_config(cfg);
    let Some(local) = cache.local() else {
        bail!("the local build cache is disabled in the settings");
    };

    match action {
        CacheCommand::Stats => {
            let stats = local.stats()?;
            println!("cache directory: {}", local.dir().display());
            println!("entries:         {}", stats.entries);
            println!("total size:      {}", stats.formatted_size());
        }
        CacheCommand::Evict => {
            let stats = local.evict()?;
            println!(
                "removed {} expired and {} over-size entries ({} bytes freed); {} kept",
                stats.removed_expired, stats.removed_for_size, stats.freed_bytes, stats.kept
            );
        }
    }
    Ok(())
}

fn run_history_command(cfg: &EngineConfig, action: HistoryCommand) -> Result<()> {
    if cfg.history.storage == HistoryStorageMode::Memory {
        bail!("history storage is \"memory\"; there is nothing on disk to inspect");
    }
    let store = FileHistoryStore::new(&cfg.history.dir);
    debug!(dir = %store.dir().display(), "opened execution history");

    match action {
        HistoryCommand::List => {
            for task in store.task_paths()? {
                match store.load(&task)? {
                    Some(record) => println!("{task}\t{:?}\t{}", record.outcome, record.recorded_at_ms),
                    None => println!("{task}\t(unreadable)"),
                }
            }
        }
        HistoryCommand::Show { task } => {
            let Some(record) = store.load(&task)? else {
                bail!("no execution record for task '{task}'");
            };
            println!("task:        {}", record.task_path);
            println!("outcome:     {:?}", record.outcome);
            println!("recorded at: {} ms", record.recorded_at_ms);
            match &record.cache_key {
                Some(key) => println!("cache key:   {key}"),
                None => println!("cache key:   (none)"),
            }
            match &record.input_fingerprint {
                Some(inputs) => {
                    println!("implementation: {}", inputs.implementation_hash);
                    for (name, hash) in inputs.property_hashes() {
                        println!("  input  {name}: {hash}");
                    }
                }
                None => println!("inputs:      (unknown)"),
            }
            for (name, snapshot) in &record.output_fingerprint.properties {
                println!("  output {name}: {} ({} files)", snapshot.hash(), snapshot.file_count());
            }
        }
        HistoryCommand::Forget { task } => {
            if store.remove(&task)? {
                println!("forgot execution record for '{task}'");
            } else {
                println!("no execution record for '{task}'");
            }
        }
    }
    Ok(())
}

fn print_config(cfg: &EngineConfig) {
    println!("kiln settings");
    println!("  build.max_parallelism = {}", cfg.build.max_parallelism);
    println!("  build.failure_policy = {:?}", cfg.build.failure_policy);
    if !cfg.build.force_rerun.is_empty() {
        println!("  build.force_rerun = {:?}", cfg.build.force_rerun);
    }
    println!("  history.storage = {:?}", cfg.history.storage);
    println!("  history.dir = {}", cfg.history.dir.display());
    match &cfg.cache.local {
        Some(local) => {
            println!("  cache.local.dir = {}", local.dir.display());
            if let Some(size) = local.max_size {
                println!("  cache.local.max_size = {size}");
            }
            if let Some(age) = local.max_age {
                println!("  cache.local.max_age = {}s", age.as_secs());
            }
        }
        None => println!("  cache.local = disabled"),
    }
    match &cfg.cache.remote {
        Some(remote) => {
            println!("  cache.remote.dir = {}", remote.dir.display());
            println!("  cache.remote.push = {}", remote.push);
            println!("  cache.remote.max_attempts = {}", remote.retry.max_attempts);
        }
        None => println!("  cache.remote = none"),
    }
}
