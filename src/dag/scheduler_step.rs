// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::{ScheduledTask, SkipReason};

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the graph and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Nodes dispatched to the executor as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Nodes that were newly marked as failed in this step.
    pub newly_failed: Vec<String>,
    /// Nodes that will never run, with the reason.
    pub newly_skipped: Vec<(String, SkipReason)>,
    /// Whether this step left every node in a terminal state.
    pub build_just_finished: bool,
}
