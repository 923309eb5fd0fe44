// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor
//! - forwarding Ctrl+C as cancellation
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use std::time::Duration;

use crate::dag::{Scheduler, TaskGraph};
use crate::engine::event_handlers::{
    handle_build_start, handle_cancel, handle_task_completion, CoreCommand, CoreStep,
};
use crate::engine::RuntimeEvent;
use crate::report::{BuildResult, NodeReport};

/// Pure core runtime state.
///
/// This owns the scheduler plus the bookkeeping needed for the final
/// report. It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    durations: Vec<Option<Duration>>,
    dispatch_order: Vec<String>,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        let len = scheduler.graph().len();
        Self {
            scheduler,
            durations: vec![None; len],
            dispatch_order: Vec::new(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn graph(&self) -> &TaskGraph {
        self.scheduler.graph()
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Begin the build.
    pub fn start(&mut self) -> CoreStep {
        let step = handle_build_start(&mut self.scheduler);
        self.note_dispatches(&step);
        step
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let step = match event {
            RuntimeEvent::TaskCompleted {
                node,
                outcome,
                duration,
            } => {
                if let Some(slot) = self.durations.get_mut(node) {
                    *slot = Some(duration);
                }
                handle_task_completion(&mut self.scheduler, node, outcome)
            }
            RuntimeEvent::CancelRequested => handle_cancel(&mut self.scheduler),
        };
        self.note_dispatches(&step);
        step
    }

    fn note_dispatches(&mut self, step: &CoreStep) {
        for command in &step.commands {
            if let CoreCommand::DispatchTasks(tasks) = command {
                self.dispatch_order
                    .extend(tasks.iter().map(|t| t.path.clone()));
            }
        }
    }

    /// Summarise the build so far.
    pub fn report(&self, duration: Duration) -> BuildResult {
        let nodes = self
            .scheduler
            .task_infos()
            .iter()
            .map(|info| NodeReport {
                path: info.path.clone(),
                state: info.state,
                duration: self.durations[info.id],
                failure: info.failure.clone(),
            })
            .collect();
        BuildResult {
            nodes,
            dispatch_order: self.dispatch_order.clone(),
            duration,
            cancelled: self.scheduler.is_cancelled(),
        }
    }
}
