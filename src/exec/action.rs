// src/exec/action.rs

//! The opaque unit of work attached to every task node.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

use super::cancel::Cancellation;

/// Capability interface implemented per task kind.
///
/// The engine never inspects concrete action types. It only hashes
/// [`Action::implementation_id`] into the implementation hash and calls
/// [`Action::execute`] when the task is out of date.
pub trait Action: Send + Sync {
    /// Stable identity of the code performing the action.
    ///
    /// Changing it invalidates previous executions and cache entries even
    /// when inputs are identical.
    fn implementation_id(&self) -> String;

    fn execute(&self, ctx: &ActionContext) -> Result<()>;
}

/// What an action gets to see while it runs.
#[derive(Debug, Clone)]
pub struct ActionContext {
    task_path: String,
    outputs: BTreeMap<String, PathBuf>,
    cancellation: Cancellation,
}

impl ActionContext {
    pub fn new(
        task_path: impl Into<String>,
        outputs: BTreeMap<String, PathBuf>,
        cancellation: Cancellation,
    ) -> Self {
        Self {
            task_path: task_path.into(),
            outputs,
            cancellation,
        }
    }

    pub fn task_path(&self) -> &str {
        &self.task_path
    }

    /// Resolved location of the named output property.
    pub fn output(&self, name: &str) -> Option<&Path> {
        self.outputs.get(name).map(PathBuf::as_path)
    }

    pub fn outputs(&self) -> &BTreeMap<String, PathBuf> {
        &self.outputs
    }

    /// Long-running actions should poll this and return early.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }
}

type ActionFn = dyn Fn(&ActionContext) -> Result<()> + Send + Sync;

/// Action backed by a closure and an explicit implementation id.
pub struct FnAction {
    implementation_id: String,
    f: Box<ActionFn>,
}

impl FnAction {
    pub fn new<F>(implementation_id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ActionContext) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            implementation_id: implementation_id.into(),
            f: Box::new(f),
        }
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("implementation_id", &self.implementation_id)
            .finish_non_exhaustive()
    }
}

impl Action for FnAction {
    fn implementation_id(&self) -> String {
        self.implementation_id.clone()
    }

    fn execute(&self, ctx: &ActionContext) -> Result<()> {
        (self.f)(ctx)
    }
}
