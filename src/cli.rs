// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! The `kiln` binary only inspects and maintains the on-disk stores; builds
//! are driven through the library API.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `kiln`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "kiln",
    version,
    about = "Inspect and maintain kiln's execution history and build cache.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the settings file (TOML).
    ///
    /// Default: `$KILN_CONFIG`, or `kiln.toml` in the current directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `KILN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Local build cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
    /// Execution history inspection.
    History {
        #[command(subcommand)]
        action: HistoryCommand,
    },
    /// Settings file checks.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum CacheCommand {
    /// Print entry count and total size.
    Stats,
    /// Remove expired entries, then least recently used ones over the size limit.
    Evict,
}

#[derive(Debug, Clone, Subcommand)]
pub enum HistoryCommand {
    /// List tasks with a recorded execution.
    List,
    /// Show the record of one task.
    Show {
        #[arg(value_name = "TASK")]
        task: String,
    },
    /// Delete the record of one task so it executes next time.
    Forget {
        #[arg(value_name = "TASK")]
        task: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Validate the settings file and print the resolved values.
    Check,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
