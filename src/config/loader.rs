// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{EngineConfig, RawEngineConfig};
use crate::errors::Result;

/// Environment variable overriding [`default_config_path`].
pub const CONFIG_ENV: &str = "KILN_CONFIG";

/// Load a settings file from a given path and return the raw `RawEngineConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawEngineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawEngineConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a settings file from path, validate it, and resolve relative
/// directories against the file's own directory.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let config = EngineConfig::try_from(raw_config)?;
    let base = config_root_dir(path);
    debug!(path = %path.display(), base = %base.display(), "loaded engine settings");
    Ok(config.resolve_paths(&base))
}

/// `KILN_CONFIG` if set, otherwise `kiln.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("kiln.toml"))
}

/// - If the path has a non-empty parent (e.g. "ci/kiln.toml"), use it.
/// - If it's just a bare filename like "kiln.toml" (parent = ""),
///   fall back to the current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
