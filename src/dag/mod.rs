// src/dag/mod.rs

//! Task graph representation and scheduling.
//!
//! - [`node`] describes task nodes, their properties and edges.
//! - [`graph`] holds the validated, immutable arena of nodes.
//! - [`validate`] checks references, properties and cycles.
//! - [`scheduler`] contains the per-build state machine that decides
//!   which nodes are ready to run.
//! - [`task_info`] provides node state and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages node state transitions.

pub mod graph;
pub mod node;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;
pub mod validate;

pub use graph::{NodeId, TaskGraph};
pub use node::{
    EdgeKind, PathSensitivity, PropertyDescriptor, PropertyRole, PropertyValue, ScalarValue,
    TaskNode, ValueKind,
};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{ExecutionKind, NodeState, ScheduledTask, SkipReason};
