// src/dag/scheduler.rs

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::{NodeId, TaskGraph};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{DispatchMode, ReadOnlyStateManager, Readiness, StateManager};
use crate::dag::task_info::{ExecutionKind, NodeState, ScheduledTask, SkipReason, TaskInfo};
use crate::engine::TaskOutcome;
use crate::types::FailurePolicy;

/// Scheduler holds the immutable graph plus mutable per-build node state.
///
/// It is responsible for:
/// - deciding when a node is "ready" (predecessors done)
/// - handing out ready nodes in topological order, within the parallelism cap
/// - recording outcomes and skipping `dependsOn` dependents of failures
/// - applying the failure policy and cancellation
///
/// It performs no I/O; the runtime feeds it completions and cancellation.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<TaskGraph>,
    tasks: Vec<TaskInfo>,
    policy: FailurePolicy,
    max_parallelism: usize,
    mode: DispatchMode,
    started: bool,
    finished: bool,
}

impl Scheduler {
    pub fn new(graph: Arc<TaskGraph>, policy: FailurePolicy, max_parallelism: usize) -> Self {
        let tasks = TaskInfo::for_graph(&graph);
        Self {
            graph,
            tasks,
            policy,
            max_parallelism: max_parallelism.max(1),
            mode: DispatchMode::Normal,
            started: false,
            finished: false,
        }
    }

    pub fn graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }

    /// Returns `true` once every node is terminal.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_cancelled(&self) -> bool {
        self.mode == DispatchMode::Halted
    }

    pub fn state_of_node(&self, id: NodeId) -> NodeState {
        self.tasks[id].state
    }

    pub fn state_of(&self, task: &str) -> Option<NodeState> {
        self.graph.id_of(task).map(|id| self.tasks[id].state)
    }

    pub fn task_infos(&self) -> &[TaskInfo] {
        &self.tasks
    }

    pub fn running_count(&self) -> usize {
        ReadOnlyStateManager::new(&self.graph, &self.tasks).running_count()
    }

    /// Whether the predecessors of `task` currently allow it to start.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let id = self.graph.id_of(task)?;
        let mgr = ReadOnlyStateManager::new(&self.graph, &self.tasks);
        Some(mgr.readiness(id) == Readiness::Ready)
    }

    /// Begin the build (production API).
    pub fn start(&mut self) -> Vec<ScheduledTask> {
        self.step_start().newly_scheduled
    }

    /// Record a node's outcome (production API).
    pub fn handle_completion(&mut self, node: NodeId, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        self.step_completion(node, outcome).newly_scheduled
    }

    /// Manual-step variant of `start` that returns a rich [`SchedulerStep`].
    pub fn step_start(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.started {
            warn!("scheduler already started; ignoring");
            return step;
        }
        self.started = true;
        debug!(nodes = self.tasks.len(), "scheduler: starting build");
        self.advance(&mut step);
        step
    }

    /// Manual-step variant of `handle_completion` that returns a rich [`SchedulerStep`].
    pub fn step_completion(&mut self, node: NodeId, outcome: TaskOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        let Some(info) = self.tasks.get_mut(node) else {
            warn!(node, "completion for unknown node; ignoring");
            return step;
        };
        if info.state != NodeState::Running {
            warn!(task = %info.path, state = %info.state, "completion for a node that is not running; ignoring");
            return step;
        }

        match outcome {
            TaskOutcome::Executed => info.state = NodeState::Succeeded(ExecutionKind::Executed),
            TaskOutcome::UpToDate => info.state = NodeState::Succeeded(ExecutionKind::UpToDate),
            TaskOutcome::FromCache => info.state = NodeState::Succeeded(ExecutionKind::FromCache),
            TaskOutcome::Failed(message) => {
                warn!(task = %info.path, error = %message, "task failed; skipping dependents");
                info.state = NodeState::Failed;
                info.failure = Some(message);
                step.newly_failed.push(info.path.clone());

                let mut manager = StateManager::new(&self.graph, &mut self.tasks);
                step.newly_skipped.extend(manager.skip_dependents(node));

                if self.policy == FailurePolicy::FailFast && self.mode == DispatchMode::Normal {
                    info!("fail-fast: only finalizers (with their dependencies) and ordering-only successors of the failure may still start");
                    self.mode = DispatchMode::Draining;
                }
            }
        }

        self.advance(&mut step);
        step
    }

    /// Stop dispatching. Every node that has not started is skipped; running
    /// nodes still report their outcome.
    pub fn step_cancel(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.finished || self.mode == DispatchMode::Halted {
            return step;
        }
        info!(running = self.running_count(), "scheduler: build cancelled");
        self.mode = DispatchMode::Halted;
        self.advance(&mut step);
        step
    }

    /// Dispatch what can run; once nothing is running, skip what can no
    /// longer run and repeat until the build is either busy or finished.
    fn advance(&mut self, step: &mut SchedulerStep) {
        if self.finished || !self.started {
            return;
        }
        let skip_reason = match self.mode {
            DispatchMode::Halted => SkipReason::Cancelled,
            _ => SkipReason::FailFast,
        };

        loop {
            let mut manager = StateManager::new(&self.graph, &mut self.tasks);
            manager.promote_ready();
            if self.mode == DispatchMode::Halted {
                step.newly_skipped
                    .extend(manager.skip_undispatchable(self.mode, skip_reason));
            }
            step.newly_scheduled
                .extend(manager.dispatch(self.max_parallelism, self.mode));

            if manager.running_count() > 0 {
                return;
            }
            if manager.all_terminal() {
                self.finished = true;
                step.build_just_finished = true;
                info!("scheduler: all tasks terminal; build finished");
                return;
            }

            // Idle with work left: whatever cannot be dispatched never will be.
            let mut skipped = manager.skip_undispatchable(self.mode, skip_reason);
            if skipped.is_empty() {
                warn!("scheduler: no task can make progress; skipping the rest");
                skipped = manager.skip_remaining(skip_reason);
            }
            step.newly_skipped.extend(skipped);
        }
    }
}
