// src/engine/runtime.rs

use std::fmt;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::errors::{KilnError, Result};
use crate::exec::ExecutorBackend;
use crate::report::BuildResult;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep};

/// Drives the scheduler in response to `RuntimeEvent`s,
/// and delegates node execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics. This struct handles async IO: reading events from
/// channels and dispatching tasks to the executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<super::RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<super::RuntimeEvent>,
        executor: E,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Starts the build and dispatches the initially ready nodes.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them into the core.
    /// - Executes commands returned by the core until every node is terminal.
    pub async fn run(mut self) -> Result<BuildResult> {
        let started = Instant::now();
        info!(tasks = self.core.graph().len(), "kiln build started");

        let step = self.core.start();
        let mut keep_running = self.apply(step).await?;

        while keep_running {
            let Some(event) = self.event_rx.recv().await else {
                warn!(
                    running = self.core.scheduler().running_count(),
                    "runtime event channel closed before the build finished"
                );
                return Err(KilnError::Other(anyhow::anyhow!(
                    "event channel closed with {} task(s) still running",
                    self.core.scheduler().running_count()
                )));
            };

            debug!(?event, "runtime received event");
            let step = self.core.step(event);
            keep_running = self.apply(step).await?;
        }

        let result = self.core.report(started.elapsed());
        info!(
            success = result.success(),
            cancelled = result.cancelled,
            elapsed_ms = result.duration.as_millis() as u64,
            "{}",
            result.summary_line()
        );
        Ok(result)
    }

    async fn apply(&mut self, step: CoreStep) -> Result<bool> {
        for command in step.commands {
            self.execute_command(command).await?;
        }
        Ok(step.keep_running)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::InterruptRunning => {
                info!("interrupting running tasks");
                self.executor.interrupt();
            }
            CoreCommand::Finish => {
                debug!("core issued Finish command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let paths: Vec<_> = tasks.iter().map(|t| t.path.as_str()).collect();
        debug!(?paths, "dispatching ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}
