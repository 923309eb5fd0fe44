// src/exec/mod.rs

//! Execution layer.
//!
//! This module runs the actions attached to task nodes and reports back to
//! the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`action`] defines the `Action` trait and its context.
//! - [`command`] provides a shell-command action.
//! - [`task_runner`] runs the per-node pipeline (check, restore or execute,
//!   record, cache).
//! - [`resources`] hands out process-wide exclusive resources.
//! - [`cancel`] is the shared cancellation flag.
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `WorkerPoolBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod action;
pub mod backend;
pub mod cancel;
pub mod command;
pub mod resources;
pub mod task_runner;

pub use action::{Action, ActionContext, FnAction};
pub use backend::{ExecutorBackend, WorkerPoolBackend};
pub use cancel::Cancellation;
pub use command::CommandAction;
pub use resources::ResourceLocks;
