#![allow(dead_code)]

use std::sync::Arc;

use kiln::dag::{TaskGraph, TaskNode};
use kiln::errors::KilnError;
use kiln::exec::{Action, ActionContext};

/// An action that does nothing; its implementation id is `noop`.
#[derive(Debug, Default)]
pub struct NoopAction;

impl Action for NoopAction {
    fn implementation_id(&self) -> String {
        "noop".to_string()
    }

    fn execute(&self, _ctx: &ActionContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A node with a no-op action.
pub fn task(path: &str) -> TaskNode {
    TaskNode::new(path, Arc::new(NoopAction))
}

/// Builder for `TaskGraph` to simplify test setup.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<TaskNode>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: TaskNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// A no-op node depending on `deps`.
    pub fn task(mut self, path: &str, deps: &[&str]) -> Self {
        let mut node = task(path);
        for dep in deps {
            node = node.depends_on(*dep);
        }
        self.nodes.push(node);
        self
    }

    pub fn try_build(self) -> Result<TaskGraph, KilnError> {
        TaskGraph::build(self.nodes)
    }

    pub fn build(self) -> TaskGraph {
        self.try_build().expect("Failed to build valid graph from builder")
    }
}
