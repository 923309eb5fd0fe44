// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheError;
use crate::dag::EdgeKind;
use crate::history::HistoryError;

#[derive(Error, Debug)]
pub enum KilnError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task '{0}' is declared more than once in the graph")]
    DuplicateNode(String),

    #[error("Task '{referenced_by}' references unknown task '{node}' in `{edge}`")]
    UnknownNode {
        node: String,
        referenced_by: String,
        edge: EdgeKind,
    },

    #[error("Cycle detected in task graph: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("finalizedBy edges form a cycle with dependsOn: {}", .path.join(" -> "))]
    FinalizerCycle { path: Vec<String> },

    #[error("Invalid property '{property}' on task '{task}': {reason}")]
    InvalidProperty {
        task: String,
        property: String,
        reason: String,
    },

    #[error("Input '{property}' of task '{task}' is unreadable at {path:?}: {source}")]
    UnreadableInput {
        task: String,
        property: String,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KilnError {
    /// Whether this error describes a bad task graph or bad settings.
    ///
    /// Configuration errors abort the build before anything executes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KilnError::Config(_)
                | KilnError::DuplicateNode(_)
                | KilnError::UnknownNode { .. }
                | KilnError::Cycle { .. }
                | KilnError::FinalizerCycle { .. }
                | KilnError::InvalidProperty { .. }
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, KilnError>;
