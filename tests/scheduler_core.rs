// tests/scheduler_core.rs

//! Drives the scheduler state machine by hand, without any runtime.

use std::sync::Arc;

use kiln::dag::{ExecutionKind, NodeState, ScheduledTask, Scheduler, SkipReason, TaskGraph};
use kiln::engine::TaskOutcome;
use kiln::types::FailurePolicy;
use kiln_test_utils::builders::{task, GraphBuilder};

fn scheduler(graph: TaskGraph, policy: FailurePolicy, parallelism: usize) -> Scheduler {
    Scheduler::new(Arc::new(graph), policy, parallelism)
}

fn paths(tasks: &[ScheduledTask]) -> Vec<&str> {
    tasks.iter().map(|t| t.path.as_str()).collect()
}

fn complete(s: &mut Scheduler, path: &str, outcome: TaskOutcome) -> Vec<ScheduledTask> {
    let id = s.graph().id_of(path).unwrap();
    s.handle_completion(id, outcome)
}

#[test]
fn test_chain_runs_in_dependency_order() {
    let mut s = scheduler(
        GraphBuilder::new()
            .task("a", &[])
            .task("b", &["a"])
            .task("c", &["b"])
            .build(),
        FailurePolicy::FailFast,
        4,
    );

    assert_eq!(paths(&s.start()), vec!["a"]);
    assert_eq!(s.deps_satisfied("b"), Some(false));
    assert_eq!(paths(&complete(&mut s, "a", TaskOutcome::Executed)), vec!["b"]);
    assert_eq!(paths(&complete(&mut s, "b", TaskOutcome::UpToDate)), vec!["c"]);
    assert!(complete(&mut s, "c", TaskOutcome::FromCache).is_empty());

    assert!(s.is_finished());
    assert_eq!(s.state_of("a"), Some(NodeState::Succeeded(ExecutionKind::Executed)));
    assert_eq!(s.state_of("b"), Some(NodeState::Succeeded(ExecutionKind::UpToDate)));
    assert_eq!(s.state_of("c"), Some(NodeState::Succeeded(ExecutionKind::FromCache)));
}

#[test]
fn test_parallelism_cap_is_respected() {
    let mut s = scheduler(
        GraphBuilder::new()
            .task("a", &[])
            .task("b", &[])
            .task("c", &[])
            .build(),
        FailurePolicy::FailFast,
        2,
    );

    let first = s.start();
    assert_eq!(paths(&first), vec!["a", "b"]);
    assert_eq!(s.running_count(), 2);

    assert_eq!(paths(&complete(&mut s, "b", TaskOutcome::Executed)), vec!["c"]);
    assert_eq!(s.running_count(), 2);
}

#[test]
fn test_fail_fast_skips_dependents_and_stops_dispatch() {
    let mut s = scheduler(
        GraphBuilder::new()
            .task("a", &[])
            .task("b", &[])
            .task("c", &["a"])
            .task("d", &["b"])
            .build(),
        FailurePolicy::FailFast,
        1,
    );

    assert_eq!(paths(&s.start()), vec!["a"]);
    let next = complete(&mut s, "a", TaskOutcome::Failed("boom".into()));
    assert!(next.is_empty());

    assert!(s.is_finished());
    assert_eq!(s.state_of("a"), Some(NodeState::Failed));
    assert_eq!(s.state_of("c"), Some(NodeState::Skipped(SkipReason::UpstreamFailed)));
    assert_eq!(s.state_of("b"), Some(NodeState::Skipped(SkipReason::FailFast)));
    assert_eq!(s.state_of("d"), Some(NodeState::Skipped(SkipReason::UpstreamFailed)));
}

#[test]
fn test_fail_fast_lets_running_tasks_finish() {
    let mut s = scheduler(
        GraphBuilder::new()
            .task("a", &[])
            .task("b", &[])
            .task("c", &["b"])
            .build(),
        FailurePolicy::FailFast,
        2,
    );

    assert_eq!(paths(&s.start()), vec!["a", "b"]);
    assert!(complete(&mut s, "a", TaskOutcome::Failed("boom".into())).is_empty());
    assert!(!s.is_finished());
    assert_eq!(s.state_of("b"), Some(NodeState::Running));

    // `b` succeeds, but fail-fast means `c` never starts.
    assert!(complete(&mut s, "b", TaskOutcome::Executed).is_empty());
    assert!(s.is_finished());
    assert_eq!(s.state_of("b"), Some(NodeState::Succeeded(ExecutionKind::Executed)));
    assert_eq!(s.state_of("c"), Some(NodeState::Skipped(SkipReason::FailFast)));
}

#[test]
fn test_continue_policy_runs_everything_independent_of_failure() {
    let mut s = scheduler(
        GraphBuilder::new()
            .task("a", &[])
            .task("b", &[])
            .task("c", &["a"])
            .task("d", &["b"])
            .build(),
        FailurePolicy::Continue,
        1,
    );

    assert_eq!(paths(&s.start()), vec!["a"]);
    assert_eq!(paths(&complete(&mut s, "a", TaskOutcome::Failed("boom".into()))), vec!["b"]);
    assert_eq!(paths(&complete(&mut s, "b", TaskOutcome::Executed)), vec!["d"]);
    assert!(complete(&mut s, "d", TaskOutcome::Executed).is_empty());

    assert!(s.is_finished());
    assert_eq!(s.state_of("c"), Some(NodeState::Skipped(SkipReason::UpstreamFailed)));
}

#[test]
fn test_ordering_only_successor_runs_after_failure() {
    let mut s = scheduler(
        GraphBuilder::new()
            .task("a", &[])
            .node(task("b").must_run_after("a"))
            .task("c", &["a"])
            .build(),
        FailurePolicy::FailFast,
        4,
    );

    assert_eq!(paths(&s.start()), vec!["a"]);
    assert_eq!(s.deps_satisfied("b"), Some(false));
    assert_eq!(paths(&complete(&mut s, "a", TaskOutcome::Failed("boom".into()))), vec!["b"]);
    assert_eq!(s.state_of("c"), Some(NodeState::Skipped(SkipReason::UpstreamFailed)));
    assert!(complete(&mut s, "b", TaskOutcome::Executed).is_empty());
    assert!(s.is_finished());
}

#[test]
fn test_should_run_after_orders_without_dependency() {
    let mut s = scheduler(
        GraphBuilder::new()
            .node(task("lint").should_run_after("compile"))
            .task("compile", &[])
            .build(),
        FailurePolicy::FailFast,
        4,
    );

    // Both could run in parallel, but `lint` waits for `compile`.
    assert_eq!(paths(&s.start()), vec!["compile"]);
    assert_eq!(paths(&complete(&mut s, "compile", TaskOutcome::Executed)), vec!["lint"]);
}

#[test]
fn test_finalizer_runs_after_failed_task_under_fail_fast() {
    let mut s = scheduler(
        GraphBuilder::new()
            .node(task("integration").finalized_by("stop-server"))
            .task("stop-server", &[])
            .task("other", &[])
            .build(),
        FailurePolicy::FailFast,
        1,
    );

    assert_eq!(paths(&s.start()), vec!["integration"]);
    let next = complete(&mut s, "integration", TaskOutcome::Failed("tests failed".into()));
    assert_eq!(paths(&next), vec!["stop-server"]);

    assert!(complete(&mut s, "stop-server", TaskOutcome::Executed).is_empty());
    assert!(s.is_finished());
    assert_eq!(s.state_of("other"), Some(NodeState::Skipped(SkipReason::FailFast)));
}

#[test]
fn test_finalizer_waits_for_finalized_task() {
    let mut s = scheduler(
        GraphBuilder::new()
            .task("start-server", &[])
            .node(task("integration").depends_on("start-server").finalized_by("stop-server"))
            .task("stop-server", &["start-server"])
            .build(),
        FailurePolicy::FailFast,
        4,
    );

    assert_eq!(paths(&s.start()), vec!["start-server"]);
    // `stop-server` has its dependency but still waits for `integration`.
    assert_eq!(
        paths(&complete(&mut s, "start-server", TaskOutcome::Executed)),
        vec!["integration"]
    );
    assert_eq!(
        paths(&complete(&mut s, "integration", TaskOutcome::Executed)),
        vec!["stop-server"]
    );
}

#[test]
fn test_finalizer_of_upstream_skipped_task_still_runs_in_continue_mode() {
    let mut s = scheduler(
        GraphBuilder::new()
            .task("a", &[])
            .node(task("b").depends_on("a").finalized_by("fin"))
            .task("fin", &[])
            .build(),
        FailurePolicy::Continue,
        4,
    );

    assert_eq!(paths(&s.start()), vec!["a"]);
    let next = complete(&mut s, "a", TaskOutcome::Failed("boom".into()));
    assert_eq!(s.state_of("b"), Some(NodeState::Skipped(SkipReason::UpstreamFailed)));
    assert_eq!(paths(&next), vec!["fin"]);
}

#[test]
fn test_finalizer_of_fail_fast_skipped_task_runs() {
    let mut s = scheduler(
        GraphBuilder::new()
            .task("compile", &[])
            .node(task("deploy").finalized_by("notify"))
            .task("notify", &[])
            .build(),
        FailurePolicy::FailFast,
        1,
    );

    assert_eq!(paths(&s.start()), vec!["compile"]);
    let next = complete(&mut s, "compile", TaskOutcome::Failed("boom".into()));
    assert_eq!(s.state_of("deploy"), Some(NodeState::Skipped(SkipReason::FailFast)));
    assert_eq!(paths(&next), vec!["notify"]);

    assert!(complete(&mut s, "notify", TaskOutcome::Executed).is_empty());
    assert!(s.is_finished());
}

#[test]
fn test_fail_fast_runs_dependencies_of_pending_finalizer() {
    let mut s = scheduler(
        GraphBuilder::new()
            .node(task("integration").finalized_by("stop-server"))
            .task("stop-server", &["resolve-pid"])
            .task("resolve-pid", &["read-config"])
            .task("read-config", &[])
            .task("other", &[])
            .build(),
        FailurePolicy::FailFast,
        1,
    );

    assert_eq!(paths(&s.start()), vec!["integration"]);
    let next = complete(&mut s, "integration", TaskOutcome::Failed("tests failed".into()));
    assert_eq!(paths(&next), vec!["read-config"]);
    assert_eq!(s.state_of("other"), Some(NodeState::Ready));

    assert_eq!(
        paths(&complete(&mut s, "read-config", TaskOutcome::Executed)),
        vec!["resolve-pid"]
    );
    assert_eq!(
        paths(&complete(&mut s, "resolve-pid", TaskOutcome::UpToDate)),
        vec!["stop-server"]
    );
    assert!(complete(&mut s, "stop-server", TaskOutcome::Executed).is_empty());

    assert!(s.is_finished());
    assert_eq!(
        s.state_of("stop-server"),
        Some(NodeState::Succeeded(ExecutionKind::Executed))
    );
    assert_eq!(s.state_of("other"), Some(NodeState::Skipped(SkipReason::FailFast)));
}

#[test]
fn test_finalizer_dependency_that_fails_skips_finalizer() {
    let mut s = scheduler(
        GraphBuilder::new()
            .node(task("integration").finalized_by("stop-server"))
            .task("stop-server", &["resolve-pid"])
            .task("resolve-pid", &[])
            .build(),
        FailurePolicy::FailFast,
        1,
    );

    assert_eq!(paths(&s.start()), vec!["integration"]);
    let next = complete(&mut s, "integration", TaskOutcome::Failed("tests failed".into()));
    assert_eq!(paths(&next), vec!["resolve-pid"]);
    assert!(complete(&mut s, "resolve-pid", TaskOutcome::Failed("no pid".into())).is_empty());

    assert!(s.is_finished());
    assert_eq!(
        s.state_of("stop-server"),
        Some(NodeState::Skipped(SkipReason::UpstreamFailed))
    );
}

#[test]
fn test_cancel_skips_pending_and_waits_for_running() {
    let mut s = scheduler(
        GraphBuilder::new()
            .task("a", &[])
            .task("b", &["a"])
            .task("c", &[])
            .build(),
        FailurePolicy::Continue,
        1,
    );

    assert_eq!(paths(&s.start()), vec!["a"]);
    let step = s.step_cancel();
    assert!(step.newly_scheduled.is_empty());
    assert!(!step.build_just_finished);
    assert!(s.is_cancelled());
    assert_eq!(s.state_of("c"), Some(NodeState::Skipped(SkipReason::Cancelled)));

    let step = s.step_completion(0, TaskOutcome::Executed);
    assert!(step.newly_scheduled.is_empty());
    assert!(step.build_just_finished);
    assert_eq!(s.state_of("b"), Some(NodeState::Skipped(SkipReason::Cancelled)));
}

#[test]
fn test_empty_graph_finishes_immediately() {
    let mut s = scheduler(GraphBuilder::new().build(), FailurePolicy::FailFast, 4);
    let step = s.step_start();
    assert!(step.newly_scheduled.is_empty());
    assert!(step.build_just_finished);
    assert!(s.is_finished());
}

#[test]
fn test_completion_for_node_not_running_is_ignored() {
    let mut s = scheduler(
        GraphBuilder::new().task("a", &[]).task("b", &["a"]).build(),
        FailurePolicy::FailFast,
        4,
    );
    s.start();

    let b = s.graph().id_of("b").unwrap();
    let step = s.step_completion(b, TaskOutcome::Executed);
    assert!(step.newly_scheduled.is_empty());
    assert_eq!(s.state_of("b"), Some(NodeState::Pending));
}

#[test]
fn test_cancel_before_start_skips_everything() {
    let mut s = scheduler(
        GraphBuilder::new().task("a", &[]).task("b", &["a"]).build(),
        FailurePolicy::FailFast,
        4,
    );

    s.step_cancel();
    let step = s.step_start();
    assert!(step.newly_scheduled.is_empty());
    assert!(step.build_just_finished);
    assert_eq!(s.state_of("a"), Some(NodeState::Skipped(SkipReason::Cancelled)));
    assert_eq!(s.state_of("b"), Some(NodeState::Skipped(SkipReason::Cancelled)));
}
