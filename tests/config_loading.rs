// tests/config_loading.rs

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use kiln::build::cache_from_config;
use kiln::config::{load_and_validate, load_from_path, EngineConfig, RawEngineConfig};
use kiln::errors::KilnError;
use kiln::logging::resolve_level;
use kiln::types::{FailurePolicy, HistoryStorageMode};
use kiln::cli::LogLevel;
use tempfile::{NamedTempFile, TempDir};

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("kiln.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

fn expect_config_error(body: &str, needle: &str) {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{body}").unwrap();

    match load_and_validate(file.path()) {
        Err(KilnError::Config(msg)) => {
            assert!(msg.contains(needle), "message {msg:?} should mention {needle:?}");
        }
        Err(e) => panic!("Expected Config error, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_empty_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "");
    let config = load_and_validate(&path).unwrap();

    assert_eq!(config.build.failure_policy, FailurePolicy::FailFast);
    assert!(config.build.max_parallelism >= 1);
    assert_eq!(config.history.storage, HistoryStorageMode::File);
    assert_eq!(config.history.dir, dir.path().join(".kiln/history"));
    assert_eq!(
        config.cache.local.as_ref().unwrap().dir,
        dir.path().join(".kiln/cache")
    );
    assert!(config.cache.remote.is_none());
    assert_eq!(config, EngineConfig::default().resolve_paths(dir.path()));
}

#[test]
fn test_full_file_is_validated_and_resolved() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[build]
max_parallelism = 3
failure_policy = "continue"
force_rerun = [":app:test"]

[history]
storage = "memory"
dir = "state/history"

[cache.local]
dir = "/var/cache/kiln"
max_size = 1048576
max_age_days = 7

[cache.remote]
dir = "shared"
push = true
max_attempts = 5
initial_backoff_ms = 10
max_backoff_ms = 100
"#,
    );
    let config = load_and_validate(&path).unwrap();

    let options = config.build_options();
    assert_eq!(options.max_parallelism, 3);
    assert_eq!(options.failure_policy, FailurePolicy::Continue);
    assert_eq!(options.force_rerun, vec![":app:test"]);

    assert_eq!(config.history.storage, HistoryStorageMode::Memory);
    assert_eq!(config.history.dir, dir.path().join("state/history"));

    let local = config.cache.local.as_ref().unwrap();
    assert_eq!(local.dir, Path::new("/var/cache/kiln"));
    assert_eq!(local.max_size, Some(1_048_576));
    assert_eq!(local.max_age, Some(Duration::from_secs(7 * 24 * 3600)));

    let remote = config.cache.remote.as_ref().unwrap();
    assert_eq!(remote.dir, dir.path().join("shared"));
    assert!(remote.push);
    assert_eq!(remote.retry.max_attempts, 5);
    assert_eq!(remote.retry.max_backoff, Duration::from_millis(100));

    let store = cache_from_config(&config);
    assert!(store.is_enabled());
    assert!(store.remote().unwrap().push_enabled());
}

#[test]
fn test_disabling_the_cache_drops_local_and_remote() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[cache]
enabled = false

[cache.remote]
dir = "shared"
"#,
    );
    let config = load_and_validate(&path).unwrap();
    assert!(!config.cache_enabled());
    assert!(!cache_from_config(&config).is_enabled());
}

#[test]
fn test_local_cache_can_be_disabled_alone() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[cache.local]
enabled = false

[cache.remote]
dir = "shared"
"#,
    );
    let config = load_and_validate(&path).unwrap();
    assert!(config.cache.local.is_none());
    assert!(config.cache.remote.is_some());
    assert!(config.cache_enabled());
}

#[test]
fn test_zero_parallelism_is_rejected() {
    expect_config_error("[build]\nmax_parallelism = 0\n", "max_parallelism");
}

#[test]
fn test_empty_force_rerun_entry_is_rejected() {
    expect_config_error("[build]\nforce_rerun = [\"  \"]\n", "force_rerun");
}

#[test]
fn test_empty_directory_is_rejected() {
    expect_config_error("[history]\ndir = \"\"\n", "[history].dir");
}

#[test]
fn test_zero_cache_size_is_rejected() {
    expect_config_error("[cache.local]\nmax_size = 0\n", "max_size");
}

#[test]
fn test_remote_retry_settings_are_checked() {
    expect_config_error(
        "[cache.remote]\ndir = \"x\"\nmax_attempts = 0\n",
        "max_attempts",
    );
    expect_config_error(
        "[cache.remote]\ndir = \"x\"\ninitial_backoff_ms = 500\nmax_backoff_ms = 100\n",
        "initial_backoff_ms",
    );
}

#[test]
fn test_unknown_keys_and_bad_values_fail_to_parse() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[build]\nparallelism = 4\n").unwrap();
    assert!(matches!(load_from_path(file.path()), Err(KilnError::TomlError(_))));

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[build]\nfailure_policy = \"sometimes\"\n").unwrap();
    assert!(matches!(load_from_path(file.path()), Err(KilnError::TomlError(_))));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let result = load_and_validate(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(KilnError::IoError(_))));
}

#[test]
fn test_raw_config_converts_without_a_file() {
    let config = EngineConfig::try_from(RawEngineConfig::default()).unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn test_failure_policy_parses_from_strings() {
    assert_eq!("fail-fast".parse::<FailurePolicy>(), Ok(FailurePolicy::FailFast));
    assert_eq!(" Continue ".parse::<FailurePolicy>(), Ok(FailurePolicy::Continue));
    assert!("maybe".parse::<FailurePolicy>().is_err());
}

#[test]
fn test_log_level_priority() {
    assert_eq!(
        resolve_level(Some(LogLevel::Debug), Some("error")),
        tracing::Level::DEBUG
    );
    assert_eq!(resolve_level(None, Some("warning")), tracing::Level::WARN);
    assert_eq!(resolve_level(None, Some("nonsense")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}

#[test]
fn test_cli_accepts_global_flags_after_subcommand() {
    use clap::Parser;
    use kiln::cli::{CliArgs, Command, HistoryCommand};

    let args = CliArgs::try_parse_from([
        "kiln", "history", "show", ":app:compile", "--config", "ci/kiln.toml", "--log-level", "debug",
    ])
    .unwrap();
    assert_eq!(args.config.as_deref(), Some("ci/kiln.toml"));
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    match args.command {
        Command::History {
            action: HistoryCommand::Show { task },
        } => assert_eq!(task, ":app:compile"),
        other => panic!("unexpected command: {other:?}"),
    }

    assert!(CliArgs::try_parse_from(["kiln", "cache", "purge"]).is_err());
}
