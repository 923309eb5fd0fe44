// tests/runtime_fake_executor.rs

//! Runs the event loop against a scripted executor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kiln::dag::{NodeState, Scheduler, SkipReason, TaskGraph};
use kiln::engine::{CoreCommand, CoreRuntime, Runtime, RuntimeEvent, TaskOutcome};
use kiln::types::FailurePolicy;
use kiln_test_utils::builders::{task, GraphBuilder};
use kiln_test_utils::fake_executor::FakeExecutor;
use kiln_test_utils::{init_tracing, with_timeout};
use tokio::sync::mpsc;

fn core(graph: TaskGraph, policy: FailurePolicy, parallelism: usize) -> CoreRuntime {
    CoreRuntime::new(Scheduler::new(Arc::new(graph), policy, parallelism))
}

fn dispatched(commands: &[CoreCommand]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::DispatchTasks(tasks) => Some(tasks.iter().map(|t| t.path.clone())),
            _ => None,
        })
        .flatten()
        .collect()
}

#[test]
fn test_core_step_reports_finish_and_durations() {
    let mut core = core(
        GraphBuilder::new().task("a", &[]).task("b", &["a"]).build(),
        FailurePolicy::FailFast,
        2,
    );

    let step = core.start();
    assert_eq!(dispatched(&step.commands), vec!["a"]);
    assert!(step.keep_running);

    let step = core.step(RuntimeEvent::TaskCompleted {
        node: 0,
        outcome: TaskOutcome::Executed,
        duration: Duration::from_millis(12),
    });
    assert_eq!(dispatched(&step.commands), vec!["b"]);

    let step = core.step(RuntimeEvent::TaskCompleted {
        node: 1,
        outcome: TaskOutcome::UpToDate,
        duration: Duration::from_millis(3),
    });
    assert!(!step.keep_running);
    assert!(matches!(step.commands.last(), Some(CoreCommand::Finish)));

    let report = core.report(Duration::from_millis(20));
    assert!(report.success());
    assert_eq!(report.dispatch_order, vec!["a", "b"]);
    assert_eq!(report.node("a").unwrap().duration, Some(Duration::from_millis(12)));
    assert_eq!(
        report.summary_line(),
        "2 actionable tasks: 1 executed, 0 from cache, 1 up-to-date"
    );
}

#[test]
fn test_core_cancel_interrupts_running_tasks() {
    let mut core = core(
        GraphBuilder::new().task("a", &[]).task("b", &["a"]).build(),
        FailurePolicy::FailFast,
        2,
    );
    core.start();

    let step = core.step(RuntimeEvent::CancelRequested);
    assert!(step
        .commands
        .iter()
        .any(|c| matches!(c, CoreCommand::InterruptRunning)));
    assert!(step.keep_running);

    // A second request is a no-op.
    let step = core.step(RuntimeEvent::CancelRequested);
    assert!(step.commands.is_empty());

    let step = core.step(RuntimeEvent::TaskCompleted {
        node: 0,
        outcome: TaskOutcome::Failed("interrupted".into()),
        duration: Duration::from_millis(1),
    });
    assert!(!step.keep_running);

    let report = core.report(Duration::from_millis(5));
    assert!(report.cancelled);
    assert!(!report.success());
    assert_eq!(report.state_of("b"), Some(NodeState::Skipped(SkipReason::Cancelled)));
}

#[tokio::test]
async fn test_runtime_runs_diamond_in_topological_order() {
    init_tracing();

    let graph = GraphBuilder::new()
        .task("root", &[])
        .task("left", &["root"])
        .task("right", &["root"])
        .task("join", &["left", "right"])
        .build();
    let (tx, rx) = mpsc::channel(graph.len().max(1));
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(tx, Arc::clone(&executed));

    let runtime = Runtime::new(core(graph, FailurePolicy::FailFast, 4), rx, executor);
    let result = with_timeout(runtime.run()).await.unwrap();

    assert!(result.success());
    let order = executed.lock().unwrap().clone();
    assert_eq!(order.first().map(String::as_str), Some("root"));
    assert_eq!(order.last().map(String::as_str), Some("join"));
    assert_eq!(order.len(), 4);
    assert_eq!(result.dispatch_order, order);
    assert_eq!(result.counts().executed, 4);
}

#[tokio::test]
async fn test_runtime_fail_fast_keeps_ordering_successor_and_finalizer() {
    init_tracing();

    let graph = GraphBuilder::new()
        .node(task("a").finalized_by("cleanup"))
        .node(task("b").must_run_after("a"))
        .task("c", &["a"])
        .task("cleanup", &[])
        .task("unrelated", &["b", "c"])
        .build();
    let (tx, rx) = mpsc::channel(graph.len());
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(tx, Arc::clone(&executed))
        .with_outcome("a", TaskOutcome::Failed("compile error".into()));

    let runtime = Runtime::new(core(graph, FailurePolicy::FailFast, 1), rx, executor);
    let result = with_timeout(runtime.run()).await.unwrap();

    assert!(!result.success());
    assert_eq!(result.state_of("a"), Some(NodeState::Failed));
    assert_eq!(result.node("a").unwrap().failure.as_deref(), Some("compile error"));
    assert!(result.state_of("b").unwrap().is_success());
    assert!(result.state_of("cleanup").unwrap().is_success());
    assert_eq!(result.state_of("c"), Some(NodeState::Skipped(SkipReason::UpstreamFailed)));
    assert_eq!(
        result.state_of("unrelated"),
        Some(NodeState::Skipped(SkipReason::UpstreamFailed))
    );
    assert!(result.summary_line().ends_with(", 1 failed, 2 skipped"));
}

#[tokio::test]
async fn test_runtime_errors_when_event_channel_closes() {
    let graph = GraphBuilder::new().task("a", &[]).build();
    let (tx, rx) = mpsc::channel(1);
    let executed = Arc::new(Mutex::new(Vec::new()));

    // The executor's sender is closed before it can report anything.
    let (dead_tx, dead_rx) = mpsc::channel(1);
    drop(dead_rx);
    drop(tx);
    let executor = FakeExecutor::new(dead_tx, Arc::clone(&executed));

    let runtime = Runtime::new(core(graph, FailurePolicy::FailFast, 1), rx, executor);
    let result = with_timeout(runtime.run()).await;
    assert!(result.is_err());
}
