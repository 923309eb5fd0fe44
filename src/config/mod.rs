// src/config/mod.rs

//! Engine settings for kiln.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a settings file from disk (`loader.rs`).
//! - Validate and normalise it into an [`EngineConfig`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    BuildSettings, CacheSettings, EngineConfig, HistorySettings, LocalCacheSettings,
    RawEngineConfig, RemoteCacheSettings,
};
