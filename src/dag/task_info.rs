// src/dag/task_info.rs

//! Per-node scheduling state and scheduled task types.

use std::fmt;

use crate::dag::graph::{NodeId, TaskGraph};

/// How a successful node got its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionKind {
    Executed,
    UpToDate,
    FromCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// A `dependsOn` predecessor failed or was skipped.
    UpstreamFailed,
    /// Another node failed and the fail-fast policy stopped dispatch.
    FailFast,
    /// The build was cancelled before this node started.
    Cancelled,
}

/// Lifecycle of a node within one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Succeeded(ExecutionKind),
    Failed,
    Skipped(SkipReason),
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeState::Succeeded(_) | NodeState::Failed | NodeState::Skipped(_)
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NodeState::Succeeded(_))
    }

    /// Failed or skipped: dependents reached through `dependsOn` cannot run.
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, NodeState::Failed | NodeState::Skipped(_))
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Pending => write!(f, "PENDING"),
            NodeState::Ready => write!(f, "READY"),
            NodeState::Running => write!(f, "RUNNING"),
            NodeState::Succeeded(ExecutionKind::Executed) => write!(f, "EXECUTED"),
            NodeState::Succeeded(ExecutionKind::UpToDate) => write!(f, "UP-TO-DATE"),
            NodeState::Succeeded(ExecutionKind::FromCache) => write!(f, "FROM-CACHE"),
            NodeState::Failed => write!(f, "FAILED"),
            NodeState::Skipped(SkipReason::UpstreamFailed) => write!(f, "SKIPPED (upstream failed)"),
            NodeState::Skipped(SkipReason::FailFast) => write!(f, "SKIPPED (fail-fast)"),
            NodeState::Skipped(SkipReason::Cancelled) => write!(f, "SKIPPED (cancelled)"),
        }
    }
}

/// Scheduling bookkeeping for one node.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: NodeId,
    pub path: String,
    pub state: NodeState,
    /// Message of the failure, if this node failed.
    pub failure: Option<String>,
}

impl TaskInfo {
    pub fn for_graph(graph: &TaskGraph) -> Vec<TaskInfo> {
        graph
            .nodes()
            .map(|(id, node)| TaskInfo {
                id,
                path: node.path.clone(),
                state: NodeState::Pending,
                failure: None,
            })
            .collect()
    }
}

/// A node handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub node: NodeId,
    pub path: String,
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo) -> Self {
        Self {
            node: info.id,
            path: info.path.clone(),
        }
    }
}
