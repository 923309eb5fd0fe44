// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::info;

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::TaskOutcome;
use crate::dag::NodeId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Tell running actions to stop (best effort).
    InterruptRunning,
    /// Every node is terminal; the build is over.
    Finish,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Kick off the build: dispatch every node that is ready from the start.
pub fn handle_build_start(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.step_start();
    into_core_step(step, Vec::new())
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    node: NodeId,
    outcome: TaskOutcome,
) -> CoreStep {
    let step = scheduler.step_completion(node, outcome);
    into_core_step(step, Vec::new())
}

/// Handle a cancellation request.
///
/// Nothing new is dispatched; running actions are asked to stop and their
/// completions are still awaited.
pub fn handle_cancel(scheduler: &mut Scheduler) -> CoreStep {
    if scheduler.is_finished() || scheduler.is_cancelled() {
        return CoreStep {
            commands: Vec::new(),
            keep_running: !scheduler.is_finished(),
        };
    }
    let step = scheduler.step_cancel();
    into_core_step(step, vec![CoreCommand::InterruptRunning])
}

fn into_core_step(step: SchedulerStep, mut commands: Vec<CoreCommand>) -> CoreStep {
    for (task, reason) in &step.newly_skipped {
        info!(task = %task, reason = ?reason, "task SKIPPED");
    }

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    if step.build_just_finished {
        commands.push(CoreCommand::Finish);
    }
    CoreStep {
        commands,
        keep_running: !step.build_just_finished,
    }
}
