// src/snapshot/mod.rs

//! Content fingerprints of task properties.
//!
//! - [`hash`] holds the blake3 primitives.
//! - [`patterns`] compiles include/exclude filters for tree walks.
//! - [`snapshotter`] turns property values into [`Snapshot`] trees.
//! - [`fingerprint`] groups snapshots per task and diffs them.

use serde::{Deserialize, Serialize};

use crate::dag::node::PathSensitivity;

pub mod fingerprint;
pub mod hash;
pub mod patterns;
pub mod snapshotter;

pub use fingerprint::{ChangeReason, InputFingerprint, OutputFingerprint};
pub use hash::Hash;
pub use patterns::PathFilter;
pub use snapshotter::Snapshotter;

use hash::CompositeHasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Regular,
    Directory,
    Missing,
}

impl FileType {
    fn tag(self) -> u8 {
        match self {
            FileType::Regular => 1,
            FileType::Directory => 2,
            FileType::Missing => 3,
        }
    }
}

/// Immutable Merkle tree describing a property's value.
///
/// Every variant carries its precomputed `hash`; comparing two snapshots
/// only ever needs the hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Snapshot {
    Scalar {
        hash: Hash,
    },
    Leaf {
        identity: String,
        file_type: FileType,
        content_hash: Hash,
        hash: Hash,
    },
    Node {
        identity: String,
        children: Vec<Snapshot>,
        hash: Hash,
    },
}

impl Snapshot {
    pub fn hash(&self) -> Hash {
        match self {
            Snapshot::Scalar { hash } | Snapshot::Leaf { hash, .. } | Snapshot::Node { hash, .. } => {
                *hash
            }
        }
    }

    pub fn identity(&self) -> &str {
        match self {
            Snapshot::Scalar { .. } => "",
            Snapshot::Leaf { identity, .. } | Snapshot::Node { identity, .. } => identity,
        }
    }

    pub fn file_type(&self) -> Option<FileType> {
        match self {
            Snapshot::Scalar { .. } => None,
            Snapshot::Leaf { file_type, .. } => Some(*file_type),
            Snapshot::Node { .. } => Some(FileType::Directory),
        }
    }

    pub fn is_missing(&self) -> bool {
        self.file_type() == Some(FileType::Missing)
    }

    /// Number of regular files in the tree.
    pub fn file_count(&self) -> usize {
        match self {
            Snapshot::Scalar { .. } => 0,
            Snapshot::Leaf { file_type, .. } => usize::from(*file_type == FileType::Regular),
            Snapshot::Node { children, .. } => children.iter().map(Snapshot::file_count).sum(),
        }
    }

    pub(crate) fn leaf(
        identity: String,
        file_type: FileType,
        content_hash: Hash,
        sensitivity: PathSensitivity,
    ) -> Self {
        let hash = CompositeHasher::new("kiln-snapshot-leaf")
            .tag(sensitivity.tag())
            .tag(file_type.tag())
            .str(&identity)
            .hash(&content_hash)
            .finish();
        Snapshot::Leaf {
            identity,
            file_type,
            content_hash,
            hash,
        }
    }

    pub(crate) fn missing(identity: String, sensitivity: PathSensitivity) -> Self {
        let marker = Hash::of(b"kiln-missing");
        Self::leaf(identity, FileType::Missing, marker, sensitivity)
    }

    /// Compose a directory; children are sorted by identity, then hash.
    pub(crate) fn node(
        identity: String,
        mut children: Vec<Snapshot>,
        sensitivity: PathSensitivity,
    ) -> Self {
        children.sort_by(|a, b| {
            a.identity()
                .cmp(b.identity())
                .then_with(|| a.hash().cmp(&b.hash()))
        });
        let mut hasher = CompositeHasher::new("kiln-snapshot-node");
        hasher
            .tag(sensitivity.tag())
            .str(&identity)
            .u64(children.len() as u64);
        for child in &children {
            hasher.hash(&child.hash());
        }
        Snapshot::Node {
            identity,
            hash: hasher.finish(),
            children,
        }
    }
}
