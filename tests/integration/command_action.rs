#![cfg(unix)]

use std::fs;
use std::path::Path;

use kiln::dag::{ExecutionKind, NodeState};
use kiln::{CommandAction, Engine, PropertyDescriptor, TaskGraph, TaskNode};
use kiln_test_utils::with_timeout;
use tempfile::TempDir;

fn copy_graph(root: &Path, cmd: &str) -> TaskGraph {
    TaskGraph::build(vec![TaskNode::new(
        ":copy",
        std::sync::Arc::new(CommandAction::new(cmd).working_dir(root)),
    )
    .input(PropertyDescriptor::input_file("source", root.join("in.txt")))
    .output(PropertyDescriptor::output_file("out", root.join("build/out.txt")))])
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_command_writes_its_declared_output() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("in.txt"), "payload").unwrap();
    let cmd = r#"mkdir -p build && cp in.txt "$KILN_OUTPUT_OUT""#;

    let engine = Engine::in_memory(Default::default());
    let first = with_timeout(engine.run(copy_graph(dir.path(), cmd))).await.unwrap();
    assert!(first.success());
    assert_eq!(
        first.state_of(":copy"),
        Some(NodeState::Succeeded(ExecutionKind::Executed))
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("build/out.txt")).unwrap(),
        "payload"
    );

    let second = with_timeout(engine.run(copy_graph(dir.path(), cmd))).await.unwrap();
    assert_eq!(
        second.state_of(":copy"),
        Some(NodeState::Succeeded(ExecutionKind::UpToDate))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_non_zero_exit_fails_the_task() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("in.txt"), "payload").unwrap();

    let engine = Engine::in_memory(Default::default());
    let result = with_timeout(engine.run(copy_graph(dir.path(), "exit 3"))).await.unwrap();

    assert!(!result.success());
    let report = result.node(":copy").unwrap();
    assert_eq!(report.state, NodeState::Failed);
    assert!(report.failure.as_deref().unwrap().contains("exited with code 3"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_editing_the_command_reruns_the_task() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("in.txt"), "payload").unwrap();

    let engine = Engine::in_memory(Default::default());
    let first = r#"mkdir -p build && cp in.txt "$KILN_OUTPUT_OUT""#;
    let second = r#"mkdir -p build && cat in.txt in.txt > "$KILN_OUTPUT_OUT""#;

    with_timeout(engine.run(copy_graph(dir.path(), first))).await.unwrap();
    let rerun = with_timeout(engine.run(copy_graph(dir.path(), second))).await.unwrap();

    assert_eq!(
        rerun.state_of(":copy"),
        Some(NodeState::Succeeded(ExecutionKind::Executed))
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("build/out.txt")).unwrap(),
        "payloadpayload"
    );
}
