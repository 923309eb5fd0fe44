// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning work itself.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production worker pool in [`WorkerPoolBackend`].
//!
//! - `WorkerPoolBackend` is the default implementation used by the engine.
//!   Each dispatched node gets its own Tokio task that acquires the node's
//!   exclusive resources and then runs the node pipeline on the blocking pool.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::dag::{ScheduledTask, TaskGraph};
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::Result;
use crate::uptodate::UpToDateChecker;

use super::cancel::Cancellation;
use super::resources::ResourceLocks;
use super::task_runner::run_node;

/// Trait abstracting how scheduled tasks are executed.
///
/// Production code uses [`WorkerPoolBackend`]; tests can provide their own
/// implementation that doesn't run real actions.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// The implementation must eventually emit exactly one
    /// `RuntimeEvent::TaskCompleted` per dispatched task.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Best-effort request to stop running actions.
    fn interrupt(&mut self) {}
}

/// Production backend: one Tokio task per dispatched node.
///
/// The scheduler already caps how many nodes are running, so the backend
/// does not need its own pool limit.
pub struct WorkerPoolBackend {
    graph: Arc<TaskGraph>,
    checker: Arc<UpToDateChecker>,
    resources: ResourceLocks,
    cancellation: Cancellation,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl WorkerPoolBackend {
    pub fn new(
        graph: Arc<TaskGraph>,
        checker: Arc<UpToDateChecker>,
        cancellation: Cancellation,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Self {
        Self {
            graph,
            checker,
            resources: ResourceLocks::new(),
            cancellation,
            runtime_tx,
        }
    }
}

impl ExecutorBackend for WorkerPoolBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        for task in tasks {
            let worker = Worker {
                graph: Arc::clone(&self.graph),
                checker: Arc::clone(&self.checker),
                resources: self.resources.clone(),
                cancellation: self.cancellation.clone(),
                runtime_tx: self.runtime_tx.clone(),
            };
            tokio::spawn(worker.run(task));
        }
        Box::pin(async { Ok(()) })
    }

    fn interrupt(&mut self) {
        self.cancellation.cancel();
    }
}

struct Worker {
    graph: Arc<TaskGraph>,
    checker: Arc<UpToDateChecker>,
    resources: ResourceLocks,
    cancellation: Cancellation,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl Worker {
    async fn run(self, task: ScheduledTask) {
        let started = Instant::now();
        let node = task.node;
        let outcome = self.run_inner(&task).await;
        // The scheduler must be halted before it sees an interrupted node,
        // or that node's dependents would count as upstream failures.
        if self.cancellation.is_cancelled()
            && self.runtime_tx.send(RuntimeEvent::CancelRequested).await.is_err()
        {
            debug!(task = %task.path, "runtime gone; dropping cancel request");
        }
        let event = RuntimeEvent::TaskCompleted {
            node,
            outcome,
            duration: started.elapsed(),
        };
        if self.runtime_tx.send(event).await.is_err() {
            debug!(task = %task.path, "runtime gone; dropping completion");
        }
    }

    async fn run_inner(&self, task: &ScheduledTask) -> TaskOutcome {
        let resources = &self.graph.node(task.node).exclusive_resources;
        let _guard = tokio::select! {
            guard = self.resources.acquire(resources) => match guard {
                Ok(guard) => guard,
                Err(err) => {
                    error!(task = %task.path, error = %err, "resource semaphore closed");
                    return TaskOutcome::Failed(format!("could not acquire resources: {err}"));
                }
            },
            _ = self.cancellation.cancelled() => {
                warn!(task = %task.path, "cancelled while waiting for exclusive resources");
                return TaskOutcome::Failed("interrupted before start".to_string());
            }
        };

        let graph = Arc::clone(&self.graph);
        let checker = Arc::clone(&self.checker);
        let cancellation = self.cancellation.clone();
        let id = task.node;
        match tokio::task::spawn_blocking(move || run_node(graph.node(id), &checker, &cancellation)).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(task = %task.path, error = %err, "worker thread failed");
                TaskOutcome::Failed(format!("worker thread failed: {err}"))
            }
        }
    }
}
