// src/dag/state_manager.rs

//! Node state transitions for the scheduler.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::dag::graph::{NodeId, TaskGraph};
use crate::dag::task_info::{NodeState, ScheduledTask, SkipReason, TaskInfo};

/// Which ready nodes the scheduler may still hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Everything whose predecessors allow it.
    Normal,
    /// Fail-fast after a failure: only finalizers, the `dependsOn`
    /// predecessors they still need, and ordering-only successors of failed
    /// nodes.
    Draining,
    /// Cancelled: nothing new starts.
    Halted,
}

/// Whether a pending node's predecessors let it start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Waiting,
    /// A `dependsOn` predecessor failed or was skipped.
    Blocked,
}

/// Manages state transitions for nodes.
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
    tasks: &'a mut [TaskInfo],
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a TaskGraph, tasks: &'a mut [TaskInfo]) -> Self {
        Self { graph, tasks }
    }

    fn read_only(&self) -> ReadOnlyStateManager<'_> {
        ReadOnlyStateManager::new(self.graph, self.tasks)
    }

    /// Skip every non-terminal node reachable through `dependsOn` edges from
    /// `root`. Ordering and finalizer edges are not followed.
    pub fn skip_dependents(&mut self, root: NodeId) -> Vec<(String, SkipReason)> {
        let mut stack: Vec<NodeId> = self.graph.dependents_of(root).to_vec();
        let mut skipped = Vec::new();

        while let Some(id) = stack.pop() {
            let info = &mut self.tasks[id];
            if matches!(info.state, NodeState::Pending | NodeState::Ready) {
                info.state = NodeState::Skipped(SkipReason::UpstreamFailed);
                debug!(task = %info.path, "skipping dependent due to upstream failure");
                skipped.push((info.path.clone(), SkipReason::UpstreamFailed));
                stack.extend_from_slice(self.graph.dependents_of(id));
            }
        }
        skipped
    }

    /// Move pending nodes whose predecessors are done to `Ready`.
    pub fn promote_ready(&mut self) {
        let candidates: Vec<NodeId> = self
            .tasks
            .iter()
            .filter(|info| info.state == NodeState::Pending)
            .filter(|info| self.read_only().readiness(info.id) == Readiness::Ready)
            .map(|info| info.id)
            .collect();

        for id in candidates {
            debug!(task = %self.tasks[id].path, "predecessors done; marking Ready");
            self.tasks[id].state = NodeState::Ready;
        }
    }

    /// Hand out ready nodes in topological order, keeping at most
    /// `max_parallelism` nodes running.
    pub fn dispatch(&mut self, max_parallelism: usize, mode: DispatchMode) -> Vec<ScheduledTask> {
        let running = self.read_only().running_count();
        let mut slots = max_parallelism.saturating_sub(running);
        let mut scheduled = Vec::new();

        for &id in self.graph.topological_order() {
            if slots == 0 {
                break;
            }
            if self.tasks[id].state != NodeState::Ready || !self.read_only().eligible(id, mode) {
                continue;
            }
            let info = &mut self.tasks[id];
            info.state = NodeState::Running;
            info!(task = %info.path, "dispatching task");
            scheduled.push(ScheduledTask::from_task_info(info));
            slots -= 1;
        }
        scheduled
    }

    /// Skip nodes that can no longer be dispatched under `mode`, plus their
    /// `dependsOn` dependents.
    pub fn skip_undispatchable(&mut self, mode: DispatchMode, reason: SkipReason) -> Vec<(String, SkipReason)> {
        let stuck: Vec<NodeId> = self
            .tasks
            .iter()
            .filter(|info| matches!(info.state, NodeState::Pending | NodeState::Ready))
            .filter(|info| !self.read_only().eligible(info.id, mode))
            .map(|info| info.id)
            .collect();
        self.skip_all(stuck, reason)
    }

    /// Skip every node that has not started.
    pub fn skip_remaining(&mut self, reason: SkipReason) -> Vec<(String, SkipReason)> {
        let remaining: Vec<NodeId> = self
            .tasks
            .iter()
            .filter(|info| matches!(info.state, NodeState::Pending | NodeState::Ready))
            .map(|info| info.id)
            .collect();
        self.skip_all(remaining, reason)
    }

    fn skip_all(&mut self, ids: Vec<NodeId>, reason: SkipReason) -> Vec<(String, SkipReason)> {
        let mut skipped = Vec::new();
        for id in ids {
            let info = &mut self.tasks[id];
            if !matches!(info.state, NodeState::Pending | NodeState::Ready) {
                continue;
            }
            info.state = NodeState::Skipped(reason);
            debug!(task = %info.path, reason = ?reason, "skipping task");
            skipped.push((info.path.clone(), reason));
            skipped.extend(self.skip_dependents(id));
        }
        skipped
    }

    pub fn running_count(&self) -> usize {
        self.read_only().running_count()
    }

    pub fn all_terminal(&self) -> bool {
        self.read_only().all_terminal()
    }
}

/// A read-only view of node states.
///
/// This is used when we only have shared access to the task list (e.g. in
/// `Scheduler::deps_satisfied`).
pub struct ReadOnlyStateManager<'a> {
    graph: &'a TaskGraph,
    tasks: &'a [TaskInfo],
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(graph: &'a TaskGraph, tasks: &'a [TaskInfo]) -> Self {
        Self { graph, tasks }
    }

    /// `dependsOn` predecessors must have succeeded; ordering predecessors and
    /// finalized nodes only have to be terminal.
    pub fn readiness(&self, id: NodeId) -> Readiness {
        let mut waiting = false;
        for &dep in self.graph.depends_on(id) {
            let state = self.tasks[dep].state;
            if state.blocks_dependents() {
                return Readiness::Blocked;
            }
            if !state.is_success() {
                waiting = true;
            }
        }

        let after_terminal = self
            .graph
            .ordering_preds(id)
            .iter()
            .chain(self.graph.finalized_nodes(id))
            .all(|&pred| self.tasks[pred].state.is_terminal());

        if waiting || !after_terminal {
            Readiness::Waiting
        } else {
            Readiness::Ready
        }
    }

    /// Whether a ready node may start under `mode`.
    pub fn eligible(&self, id: NodeId, mode: DispatchMode) -> bool {
        match mode {
            DispatchMode::Normal => true,
            DispatchMode::Halted => false,
            DispatchMode::Draining => {
                // Readiness already waits for every finalized node to be terminal.
                let follows_failure = self
                    .graph
                    .ordering_preds(id)
                    .iter()
                    .any(|&pred| self.tasks[pred].state == NodeState::Failed);
                self.graph.is_finalizer(id) || follows_failure || self.feeds_pending_finalizer(id)
            }
        }
    }

    /// Whether a finalizer that has not finished yet needs `id`, directly or
    /// through other `dependsOn` edges.
    fn feeds_pending_finalizer(&self, id: NodeId) -> bool {
        let mut stack: Vec<NodeId> = self.graph.dependents_of(id).to_vec();
        let mut seen = HashSet::new();
        while let Some(dependent) = stack.pop() {
            if !seen.insert(dependent) || self.tasks[dependent].state.is_terminal() {
                continue;
            }
            if self.graph.is_finalizer(dependent) {
                return true;
            }
            stack.extend_from_slice(self.graph.dependents_of(dependent));
        }
        false
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|info| info.state == NodeState::Running)
            .count()
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.iter().all(|info| info.state.is_terminal())
    }
}
