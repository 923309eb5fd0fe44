use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use kiln::dag::{NodeId, NodeState, Scheduler, TaskGraph};
use kiln::engine::TaskOutcome;
use kiln::types::FailurePolicy;
use kiln_test_utils::builders::task;
use proptest::prelude::*;

/// Raw edge lists for one node: (dependsOn picks, mustRunAfter picks).
type RawEdges = (Vec<usize>, Vec<usize>);

// Acyclic by construction: node N only points at nodes 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = TaskGraph> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<usize>(), 0..3),
                proptest::collection::vec(any::<usize>(), 0..2),
            ),
            num_tasks,
        )
        .prop_map(build_graph)
    })
}

fn build_graph(raw: Vec<RawEdges>) -> TaskGraph {
    let mut nodes = Vec::with_capacity(raw.len());
    for (i, (deps, after)) in raw.into_iter().enumerate() {
        let mut node = task(&format!(":t{i}"));
        if i > 0 {
            let deps: BTreeSet<usize> = deps.into_iter().map(|d| d % i).collect();
            for d in &deps {
                node = node.depends_on(format!(":t{d}"));
            }
            let after: BTreeSet<usize> = after
                .into_iter()
                .map(|d| d % i)
                .filter(|d| !deps.contains(d))
                .collect();
            for d in after {
                node = node.must_run_after(format!(":t{d}"));
            }
        }
        nodes.push(node);
    }
    TaskGraph::build(nodes).expect("generated graph is acyclic")
}

fn policy_strategy() -> impl Strategy<Value = FailurePolicy> {
    prop_oneof![Just(FailurePolicy::FailFast), Just(FailurePolicy::Continue)]
}

proptest! {
    #[test]
    fn test_scheduler_terminates_and_respects_edges(
        graph in dag_strategy(12),
        policy in policy_strategy(),
        parallelism in 1usize..4,
        failing in proptest::collection::vec(0usize..12, 0..4),
        picks in proptest::collection::vec(any::<usize>(), 64),
    ) {
        let graph = Arc::new(graph);
        let failing: HashSet<NodeId> = failing.into_iter().filter(|&i| i < graph.len()).collect();
        let mut scheduler = Scheduler::new(graph.clone(), policy, parallelism);

        let mut running: Vec<NodeId> = Vec::new();
        let mut dispatched: HashSet<NodeId> = HashSet::new();
        let mut pick = picks.iter().cycle();

        let mut newly = scheduler.start();
        let mut steps = 0;
        loop {
            for scheduled in newly.drain(..) {
                let id = scheduled.node;
                prop_assert!(dispatched.insert(id), "{} dispatched twice", scheduled.path);
                for &dep in graph.depends_on(id) {
                    prop_assert!(
                        scheduler.state_of_node(dep).is_success(),
                        "{} dispatched before dependency {} succeeded",
                        scheduled.path,
                        graph.path_of(dep)
                    );
                }
                for &pred in graph.ordering_preds(id) {
                    prop_assert!(scheduler.state_of_node(pred).is_terminal());
                }
                running.push(id);
            }
            prop_assert!(running.len() <= parallelism);
            prop_assert_eq!(running.len(), scheduler.running_count());

            if running.is_empty() {
                break;
            }
            steps += 1;
            prop_assert!(steps <= graph.len(), "more completions than nodes");

            let id = running.remove(pick.next().copied().unwrap_or(0) % running.len());
            let outcome = if failing.contains(&id) {
                TaskOutcome::Failed("boom".to_string())
            } else {
                TaskOutcome::Executed
            };
            newly = scheduler.handle_completion(id, outcome);
        }

        prop_assert!(scheduler.is_finished());
        for (id, node) in graph.nodes() {
            let state = scheduler.state_of_node(id);
            prop_assert!(state.is_terminal(), "{} ended in {:?}", node.path, state);
        }
    }

    #[test]
    fn test_continue_policy_runs_exactly_the_unblocked_nodes(
        graph in dag_strategy(10),
        failing in proptest::collection::vec(0usize..10, 0..3),
    ) {
        let graph = Arc::new(graph);
        let failing: HashSet<NodeId> = failing.into_iter().filter(|&i| i < graph.len()).collect();
        let mut scheduler = Scheduler::new(graph.clone(), FailurePolicy::Continue, 1);

        let mut queue = scheduler.start();
        while let Some(next) = queue.pop() {
            let outcome = if failing.contains(&next.node) {
                TaskOutcome::Failed("boom".to_string())
            } else {
                TaskOutcome::Executed
            };
            queue.extend(scheduler.handle_completion(next.node, outcome));
        }

        // Node ids follow declaration order, so every dependency is decided
        // before its dependents in this scan.
        let mut blocked: HashSet<NodeId> = HashSet::new();
        for (id, node) in graph.nodes() {
            let state = scheduler.state_of_node(id);
            let upstream_blocked = graph.depends_on(id).iter().any(|d| blocked.contains(d));
            if upstream_blocked {
                prop_assert!(matches!(state, NodeState::Skipped(_)), "{} should be skipped", node.path);
                blocked.insert(id);
            } else if failing.contains(&id) {
                prop_assert_eq!(state, NodeState::Failed);
                blocked.insert(id);
            } else {
                prop_assert!(state.is_success(), "{} ended in {:?}", node.path, state);
            }
        }
    }
}
