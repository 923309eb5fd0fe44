// src/snapshot/fingerprint.rs

//! Per-task groups of named snapshots and how they differ between builds.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::hash::Hash;
use super::Snapshot;

/// Implementation hash plus one snapshot per input property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFingerprint {
    pub implementation_hash: Hash,
    pub properties: BTreeMap<String, Snapshot>,
}

/// One snapshot per output property, captured after the task ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFingerprint {
    pub properties: BTreeMap<String, Snapshot>,
}

/// Why a task cannot be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    NoHistory,
    PreviousExecutionFailed,
    /// The previous execution could not fingerprint its inputs.
    PreviousInputsUnknown,
    ImplementationChanged,
    InputAdded(String),
    InputRemoved(String),
    InputChanged(String),
    InputUnreadable(String),
    OutputChanged(String),
    NoOutputs,
    Forced,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeReason::NoHistory => write!(f, "no execution history"),
            ChangeReason::PreviousExecutionFailed => write!(f, "previous execution failed"),
            ChangeReason::PreviousInputsUnknown => {
                write!(f, "inputs of the previous execution were not fingerprinted")
            }
            ChangeReason::ImplementationChanged => write!(f, "task implementation changed"),
            ChangeReason::InputAdded(name) => write!(f, "input '{name}' was added"),
            ChangeReason::InputRemoved(name) => write!(f, "input '{name}' was removed"),
            ChangeReason::InputChanged(name) => write!(f, "input '{name}' changed"),
            ChangeReason::InputUnreadable(name) => write!(f, "input '{name}' is unreadable"),
            ChangeReason::OutputChanged(name) => write!(f, "output '{name}' changed"),
            ChangeReason::NoOutputs => write!(f, "task declares no outputs"),
            ChangeReason::Forced => write!(f, "rerun was forced"),
        }
    }
}

impl InputFingerprint {
    pub fn changes_since(&self, previous: &InputFingerprint) -> Vec<ChangeReason> {
        let mut reasons = Vec::new();
        if self.implementation_hash != previous.implementation_hash {
            reasons.push(ChangeReason::ImplementationChanged);
        }
        for (name, snapshot) in &self.properties {
            match previous.properties.get(name) {
                None => reasons.push(ChangeReason::InputAdded(name.clone())),
                Some(prev) if prev.hash() != snapshot.hash() => {
                    reasons.push(ChangeReason::InputChanged(name.clone()))
                }
                Some(_) => {}
            }
        }
        for name in previous.properties.keys() {
            if !self.properties.contains_key(name) {
                reasons.push(ChangeReason::InputRemoved(name.clone()));
            }
        }
        reasons
    }

    /// `(name, hash)` pairs in name order.
    pub fn property_hashes(&self) -> impl Iterator<Item = (&str, Hash)> {
        self.properties.iter().map(|(name, s)| (name.as_str(), s.hash()))
    }
}

impl OutputFingerprint {
    /// Output changes are reported per property; a property added or removed
    /// since the previous build counts as changed.
    pub fn changes_since(&self, previous: &OutputFingerprint) -> Vec<ChangeReason> {
        let mut reasons = Vec::new();
        for (name, snapshot) in &self.properties {
            let unchanged = previous
                .properties
                .get(name)
                .is_some_and(|prev| prev.hash() == snapshot.hash());
            if !unchanged {
                reasons.push(ChangeReason::OutputChanged(name.clone()));
            }
        }
        for name in previous.properties.keys() {
            if !self.properties.contains_key(name) {
                reasons.push(ChangeReason::OutputChanged(name.clone()));
            }
        }
        reasons
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
