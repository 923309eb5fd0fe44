// src/history/mod.rs

//! Per-task execution records that survive between builds.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod record;
pub mod store;

pub use record::{ExecutionOutcome, ExecutionRecord, RECORD_VERSION};
pub use store::{FileHistoryStore, HistoryStore, MemoryHistoryStore};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode execution record for '{task}': {message}")]
    Encode { task: String, message: String },
}
