use std::collections::BTreeSet;

use kiln::dag::TaskGraph;
use kiln::errors::KilnError;
use kiln_test_utils::builders::task;
use proptest::prelude::*;

/// A chain `:t{i} -> :t{i-1}` plus random extra edges, all pointing at lower
/// indices. Edges are (from, to) where `from` must come after `to`.
fn chain_strategy(max_tasks: usize) -> impl Strategy<Value = (usize, BTreeSet<(usize, usize)>)> {
    (2..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec((any::<usize>(), any::<usize>()), 0..num_tasks * 2)
            .prop_map(move |extra| {
                let mut edges: BTreeSet<(usize, usize)> = (1..num_tasks).map(|i| (i, i - 1)).collect();
                for (from, to) in extra {
                    let from = from % num_tasks;
                    if from > 0 {
                        edges.insert((from, to % from));
                    }
                }
                (num_tasks, edges)
            })
    })
}

/// Builds the graph; edges whose index is odd in iteration order become
/// `mustRunAfter` so both edge kinds take part in detection.
fn build(num_tasks: usize, edges: &BTreeSet<(usize, usize)>) -> Result<TaskGraph, KilnError> {
    let nodes = (0..num_tasks)
        .map(|i| {
            edges
                .iter()
                .enumerate()
                .filter(|(_, (from, _))| *from == i)
                .fold(task(&format!(":t{i}")), |node, (n, &(_, to))| {
                    let target = format!(":t{to}");
                    if n % 2 == 0 {
                        node.depends_on(target)
                    } else {
                        node.must_run_after(target)
                    }
                })
        })
        .collect();
    TaskGraph::build(nodes)
}

fn index_of(path: &str) -> usize {
    path.trim_start_matches(":t").parse().expect("generated task name")
}

proptest! {
    #[test]
    fn test_back_edge_is_rejected_with_a_real_cycle(
        (num_tasks, edges) in chain_strategy(10),
        lo in any::<usize>(),
        span in any::<usize>(),
    ) {
        prop_assert!(build(num_tasks, &edges).is_ok());

        // The chain already orders `hi` after `lo`.
        let lo = lo % (num_tasks - 1);
        let hi = lo + 1 + span % (num_tasks - 1 - lo);
        let mut cyclic = edges.clone();
        cyclic.insert((lo, hi));

        match build(num_tasks, &cyclic) {
            Err(KilnError::Cycle { path }) => {
                prop_assert!(path.len() >= 2);
                prop_assert_eq!(path.first(), path.last());
                let distinct: BTreeSet<&String> = path[1..].iter().collect();
                prop_assert_eq!(distinct.len(), path.len() - 1);
                for pair in path.windows(2) {
                    let edge = (index_of(&pair[0]), index_of(&pair[1]));
                    prop_assert!(cyclic.contains(&edge), "{:?} is not an edge of the graph", pair);
                }
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other.map(|g| g.len())),
        }
    }

    #[test]
    fn test_self_edge_is_rejected(
        (num_tasks, edges) in chain_strategy(8),
        node in any::<usize>(),
    ) {
        let node = node % num_tasks;
        let mut cyclic = edges.clone();
        cyclic.insert((node, node));

        match build(num_tasks, &cyclic) {
            Err(KilnError::Cycle { path }) => {
                let expected = format!(":t{node}");
                prop_assert_eq!(path, vec![expected.clone(), expected]);
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other.map(|g| g.len())),
        }
    }
}
