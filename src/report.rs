// src/report.rs

//! End-of-build summary.

use std::time::Duration;

use crate::dag::{ExecutionKind, NodeState};

/// Final state of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub path: String,
    pub state: NodeState,
    /// Wall time from dispatch to completion; `None` for nodes that never ran.
    pub duration: Option<Duration>,
    pub failure: Option<String>,
}

/// Per-outcome counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub executed: usize,
    pub up_to_date: usize,
    pub from_cache: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl OutcomeCounts {
    /// Nodes that actually reached their pipeline.
    pub fn actionable(&self) -> usize {
        self.executed + self.up_to_date + self.from_cache + self.failed
    }
}

#[derive(Debug, Clone)]
pub struct BuildResult {
    /// One entry per node, in declaration order.
    pub nodes: Vec<NodeReport>,
    /// Node paths in the order they were handed to workers.
    pub dispatch_order: Vec<String>,
    pub duration: Duration,
    pub cancelled: bool,
}

impl BuildResult {
    /// `true` iff no node failed and the build was not cancelled.
    pub fn success(&self) -> bool {
        !self.cancelled && self.nodes.iter().all(|n| n.state != NodeState::Failed)
    }

    pub fn node(&self, path: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.path == path)
    }

    pub fn state_of(&self, path: &str) -> Option<NodeState> {
        self.node(path).map(|n| n.state)
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| n.state == NodeState::Failed)
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for node in &self.nodes {
            match node.state {
                NodeState::Succeeded(ExecutionKind::Executed) => counts.executed += 1,
                NodeState::Succeeded(ExecutionKind::UpToDate) => counts.up_to_date += 1,
                NodeState::Succeeded(ExecutionKind::FromCache) => counts.from_cache += 1,
                NodeState::Failed => counts.failed += 1,
                NodeState::Skipped(_) => counts.skipped += 1,
                NodeState::Pending | NodeState::Ready | NodeState::Running => {}
            }
        }
        counts
    }

    /// `"N actionable tasks: a executed, b from cache, c up-to-date"`, with
    /// failed and skipped counts appended when non-zero.
    pub fn summary_line(&self) -> String {
        let counts = self.counts();
        let noun = if counts.actionable() == 1 { "task" } else { "tasks" };
        let mut line = format!(
            "{} actionable {}: {} executed, {} from cache, {} up-to-date",
            counts.actionable(),
            noun,
            counts.executed,
            counts.from_cache,
            counts.up_to_date
        );
        if counts.failed > 0 {
            line.push_str(&format!(", {} failed", counts.failed));
        }
        if counts.skipped > 0 {
            line.push_str(&format!(", {} skipped", counts.skipped));
        }
        line
    }
}
