// src/engine/mod.rs

//! Orchestration engine for kiln.
//!
//! This module ties together:
//! - the graph scheduler
//! - the main runtime event loop that reacts to:
//!   - task completion events from the worker backend
//!   - cancellation requests (Ctrl-C, fatal errors)
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::time::Duration;

use crate::dag::NodeId;
use crate::types::FailurePolicy;

/// Outcome of one node's pipeline, as reported by the worker backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Executed,
    UpToDate,
    FromCache,
    /// The action failed or was interrupted; the message is kept for reports.
    Failed(String),
}

/// Engine-facing flags for one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub max_parallelism: usize,
    pub failure_policy: FailurePolicy,
    /// Tasks that bypass both up-to-date checks and cache loads.
    pub force_rerun: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_parallelism: default_parallelism(),
            failure_policy: FailurePolicy::default(),
            force_rerun: Vec::new(),
        }
    }
}

/// Number of available CPUs, falling back to 4.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Events flowing into the runtime from workers and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A node's pipeline finished.
    TaskCompleted {
        node: NodeId,
        outcome: TaskOutcome,
        duration: Duration,
    },
    /// Stop dispatching (e.g. Ctrl-C).
    CancelRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use self::core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
