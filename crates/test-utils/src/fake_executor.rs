use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use kiln::dag::ScheduledTask;
use kiln::engine::{RuntimeEvent, TaskOutcome};
use kiln::exec::ExecutorBackend;
use kiln::errors::Result;

/// A fake executor that:
/// - records which tasks were dispatched
/// - immediately reports `TaskCompleted` for each, with `Executed` unless
///   an outcome was scripted for that task.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    outcomes: BTreeMap<String, TaskOutcome>,
    interrupted: Arc<Mutex<bool>>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            outcomes: BTreeMap::new(),
            interrupted: Arc::new(Mutex::new(false)),
        }
    }

    /// Report `outcome` whenever `task` is dispatched.
    pub fn with_outcome(mut self, task: &str, outcome: TaskOutcome) -> Self {
        self.outcomes.insert(task.to_string(), outcome);
        self
    }

    pub fn interrupted_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.interrupted)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let outcomes = self.outcomes.clone();

        Box::pin(async move {
            for t in tasks {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(t.path.clone());
                }

                let outcome = outcomes
                    .get(&t.path)
                    .cloned()
                    .unwrap_or(TaskOutcome::Executed);
                tx.send(RuntimeEvent::TaskCompleted {
                    node: t.node,
                    outcome,
                    duration: Duration::from_millis(1),
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn interrupt(&mut self) {
        *self.interrupted.lock().unwrap() = true;
    }
}
