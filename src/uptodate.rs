// src/uptodate.rs

//! Classifies a ready task as up-to-date, loadable from cache, or in need of
//! execution.
//!
//! Decision order:
//!
//! 1. forced rerun: execute.
//! 2. no record, failed record, changed inputs, changed implementation or
//!    externally modified outputs: out of date.
//! 3. otherwise: up to date.
//! 4. out of date with a cache hit for the current key: load from cache.
//! 5. otherwise: execute.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::key::implementation_hash;
use crate::cache::{BuildCacheStore, CacheEntry, CacheKey, CacheKeyBuilder};
use crate::dag::node::TaskNode;
use crate::errors::KilnError;
use crate::history::{ExecutionOutcome, ExecutionRecord, HistoryStore};
use crate::snapshot::{ChangeReason, InputFingerprint, OutputFingerprint, Snapshotter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    UpToDate,
    FromCache { key: CacheKey },
    Execute { reasons: Vec<ChangeReason> },
}

/// Current input state of a task.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    /// `None` when any input could not be snapshotted.
    pub fingerprint: Option<InputFingerprint>,
    /// Names of unreadable input properties.
    pub unreadable: Vec<String>,
}

impl InputState {
    pub fn cache_key(&self) -> Option<CacheKey> {
        self.fingerprint.as_ref().map(CacheKeyBuilder::from_fingerprint)
    }
}

/// Everything the pipeline needs after a check.
#[derive(Debug)]
pub struct TaskCheck {
    pub decision: Decision,
    pub inputs: InputState,
    pub cache_key: Option<CacheKey>,
    /// Present for [`Decision::FromCache`].
    pub cache_entry: Option<CacheEntry>,
    /// Present for [`Decision::UpToDate`]; the outputs just verified.
    pub outputs: Option<OutputFingerprint>,
}

pub struct UpToDateChecker {
    snapshotter: Snapshotter,
    history: Arc<dyn HistoryStore>,
    cache: Arc<BuildCacheStore>,
    force_rerun: HashSet<String>,
}

impl UpToDateChecker {
    pub fn new(
        snapshotter: Snapshotter,
        history: Arc<dyn HistoryStore>,
        cache: Arc<BuildCacheStore>,
    ) -> Self {
        Self {
            snapshotter,
            history,
            cache,
            force_rerun: HashSet::new(),
        }
    }

    pub fn with_force_rerun(mut self, tasks: impl IntoIterator<Item = String>) -> Self {
        self.force_rerun.extend(tasks);
        self
    }

    pub fn history(&self) -> &dyn HistoryStore {
        self.history.as_ref()
    }

    pub fn cache(&self) -> &BuildCacheStore {
        &self.cache
    }

    /// Snapshot every input property. Unreadable inputs are logged and make
    /// the whole fingerprint unknown.
    pub fn snapshot_inputs(&self, node: &TaskNode) -> InputState {
        let mut properties = BTreeMap::new();
        let mut unreadable = Vec::new();

        for input in &node.inputs {
            match self.snapshotter.snapshot_property(input) {
                Ok(snapshot) => {
                    properties.insert(input.name.clone(), snapshot);
                }
                Err(err) => {
                    let err = KilnError::UnreadableInput {
                        task: node.path.clone(),
                        property: input.name.clone(),
                        path: input.path_value().cloned().unwrap_or_default(),
                        source: err.into(),
                    };
                    warn!(task = %node.path, property = %input.name, error = %err, "unreadable input");
                    unreadable.push(input.name.clone());
                }
            }
        }

        let fingerprint = unreadable.is_empty().then(|| InputFingerprint {
            implementation_hash: implementation_hash(&node.action.implementation_id()),
            properties,
        });
        InputState {
            fingerprint,
            unreadable,
        }
    }

    /// Snapshot every output property; a failure is logged and reported by name.
    pub fn snapshot_outputs(&self, node: &TaskNode) -> Result<OutputFingerprint, Vec<String>> {
        let mut properties = BTreeMap::new();
        let mut failed = Vec::new();
        for output in &node.outputs {
            match self.snapshotter.snapshot_property(output) {
                Ok(snapshot) => {
                    properties.insert(output.name.clone(), snapshot);
                }
                Err(err) => {
                    warn!(task = %node.path, property = %output.name, error = %err, "failed to snapshot output");
                    failed.push(output.name.clone());
                }
            }
        }
        if failed.is_empty() {
            Ok(OutputFingerprint { properties })
        } else {
            Err(failed)
        }
    }

    /// Previous record; history problems count as "no history".
    pub fn previous_record(&self, task: &str) -> Option<ExecutionRecord> {
        match self.history.load(task) {
            Ok(record) => record,
            Err(err) => {
                warn!(task = %task, error = %err, "could not read execution history; treating as none");
                None
            }
        }
    }

    pub fn check(&self, node: &TaskNode) -> TaskCheck {
        let inputs = self.snapshot_inputs(node);
        let cache_key = inputs.cache_key();

        if self.force_rerun.contains(&node.path) {
            return TaskCheck {
                decision: Decision::Execute {
                    reasons: vec![ChangeReason::Forced],
                },
                inputs,
                cache_key,
                cache_entry: None,
                outputs: None,
            };
        }

        let previous = self.previous_record(&node.path);
        let mut reasons = history_reasons(previous.as_ref(), &inputs, !node.outputs.is_empty());

        let mut verified_outputs = None;
        if reasons.is_empty() {
            // Only now pay for snapshotting outputs.
            let recorded = previous.as_ref().map(|r| &r.output_fingerprint);
            match (self.snapshot_outputs(node), recorded) {
                (Ok(current), Some(recorded)) => {
                    reasons.extend(current.changes_since(recorded));
                    verified_outputs = Some(current);
                }
                (Ok(_), None) => reasons.push(ChangeReason::NoHistory),
                (Err(failed), _) => {
                    reasons.extend(failed.into_iter().map(ChangeReason::OutputChanged));
                }
            }
        }

        if reasons.is_empty() {
            debug!(task = %node.path, "inputs and outputs unchanged");
            return TaskCheck {
                decision: Decision::UpToDate,
                inputs,
                cache_key,
                cache_entry: None,
                outputs: verified_outputs,
            };
        }

        if let Some(key) = cache_key.filter(|_| node.cacheable && !node.outputs.is_empty()) {
            if let Some(entry) = self.cache.load(&key) {
                return TaskCheck {
                    decision: Decision::FromCache { key },
                    inputs,
                    cache_key,
                    cache_entry: Some(entry),
                    outputs: None,
                };
            }
        }

        TaskCheck {
            decision: Decision::Execute { reasons },
            inputs,
            cache_key,
            cache_entry: None,
            outputs: None,
        }
    }
}

/// Reasons derivable from the record and current inputs alone (no output I/O).
///
/// An empty result means the task is up to date as far as history and
/// inputs can tell; outputs still need to be verified.
pub fn history_reasons(
    previous: Option<&ExecutionRecord>,
    inputs: &InputState,
    has_outputs: bool,
) -> Vec<ChangeReason> {
    let mut reasons: Vec<ChangeReason> = inputs
        .unreadable
        .iter()
        .cloned()
        .map(ChangeReason::InputUnreadable)
        .collect();
    if !has_outputs {
        reasons.push(ChangeReason::NoOutputs);
    }

    let Some(previous) = previous else {
        reasons.push(ChangeReason::NoHistory);
        return reasons;
    };
    if previous.outcome == ExecutionOutcome::Failed {
        reasons.push(ChangeReason::PreviousExecutionFailed);
    }
    match (&inputs.fingerprint, &previous.input_fingerprint) {
        (Some(current), Some(recorded)) => reasons.extend(current.changes_since(recorded)),
        (Some(_), None) => reasons.push(ChangeReason::PreviousInputsUnknown),
        (None, _) => {}
    }
    reasons
}
