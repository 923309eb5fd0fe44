// src/snapshot/snapshotter.rs

//! Turns property values into [`Snapshot`] trees.
//!
//! Snapshotting is read-only: it only goes through the [`FileSystem`] query
//! methods and never creates or touches anything on disk.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use super::hash::{compute_file_hash, CompositeHasher};
use super::patterns::{CompiledFilter, PathFilter};
use super::{FileType, Snapshot};
use crate::dag::node::{
    PathSensitivity, PropertyDescriptor, PropertyRole, PropertyValue, ScalarValue, ValueKind,
};
use crate::fs::{FileSystem, RealFileSystem};

#[derive(Debug, Clone)]
pub struct Snapshotter {
    fs: Arc<dyn FileSystem>,
}

impl Default for Snapshotter {
    fn default() -> Self {
        Self::new(Arc::new(RealFileSystem))
    }
}

impl Snapshotter {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Snapshot one declared property.
    ///
    /// Inputs that do not exist are an error; outputs that do not exist
    /// snapshot as a missing leaf.
    pub fn snapshot_property(&self, property: &PropertyDescriptor) -> Result<Snapshot> {
        match &property.value {
            PropertyValue::Scalar(value) => Ok(self.snapshot_scalar(value)),
            PropertyValue::Path { path, filter } => {
                let missing_ok = property.role == PropertyRole::Output;
                self.snapshot_path(path, property.kind, property.sensitivity, filter, missing_ok)
                    .with_context(|| format!("snapshotting property '{}'", property.name))
            }
        }
    }

    pub fn snapshot_scalar(&self, value: &ScalarValue) -> Snapshot {
        let mut hasher = CompositeHasher::new("kiln-scalar");
        hash_scalar(&mut hasher, value);
        Snapshot::Scalar {
            hash: hasher.finish(),
        }
    }

    pub fn snapshot_path(
        &self,
        root: &Path,
        kind: ValueKind,
        sensitivity: PathSensitivity,
        filter: &PathFilter,
        missing_ok: bool,
    ) -> Result<Snapshot> {
        if !self.fs.exists(root) {
            if missing_ok {
                return Ok(Snapshot::missing(root_identity(root, sensitivity, true), sensitivity));
            }
            bail!("declared path does not exist: {:?}", root);
        }

        if self.fs.is_file(root) {
            let content_hash = compute_file_hash(self.fs.as_ref(), root)?;
            return Ok(Snapshot::leaf(
                root_identity(root, sensitivity, true),
                FileType::Regular,
                content_hash,
                sensitivity,
            ));
        }

        if !self.fs.is_dir(root) {
            bail!("declared path is neither a file nor a directory: {:?}", root);
        }
        if kind == ValueKind::File && !missing_ok {
            bail!("expected a file but found a directory: {:?}", root);
        }

        let compiled = CompiledFilter::compile(filter)?;
        let snapshot = match sensitivity {
            PathSensitivity::Absolute | PathSensitivity::Relative => {
                let identity = root_identity(root, sensitivity, false);
                self.snapshot_dir(root, root, "", identity, sensitivity, &compiled)?
                    .unwrap_or_else(|| {
                        Snapshot::node(root_identity(root, sensitivity, false), Vec::new(), sensitivity)
                    })
            }
            PathSensitivity::NameOnly | PathSensitivity::None => {
                let mut leaves = Vec::new();
                self.collect_leaves(root, "", sensitivity, &compiled, &mut leaves)?;
                Snapshot::node(String::new(), leaves, sensitivity)
            }
        };

        debug!(
            root = ?root,
            files = snapshot.file_count(),
            hash = %snapshot.hash(),
            "snapshotted file tree"
        );
        Ok(snapshot)
    }

    /// Nested walk used by `Absolute` and `Relative`.
    ///
    /// Returns `None` for a directory that ends up empty only because an
    /// include filter removed all of its files.
    fn snapshot_dir(
        &self,
        root: &Path,
        dir: &Path,
        rel: &str,
        identity: String,
        sensitivity: PathSensitivity,
        filter: &CompiledFilter,
    ) -> Result<Option<Snapshot>> {
        let mut children = Vec::new();
        for path in self.fs.read_dir(dir)? {
            let child_rel = join_rel(rel, &path)?;
            let child_identity = match sensitivity {
                PathSensitivity::Absolute => path_string(&path),
                _ => child_rel.clone(),
            };

            if self.fs.is_dir(&path) {
                if filter.excludes_dir(&child_rel) {
                    continue;
                }
                if let Some(child) =
                    self.snapshot_dir(root, &path, &child_rel, child_identity, sensitivity, filter)?
                {
                    children.push(child);
                }
            } else if self.fs.is_file(&path) {
                if !filter.matches_file(&child_rel) {
                    continue;
                }
                let content_hash = compute_file_hash(self.fs.as_ref(), &path)?;
                children.push(Snapshot::leaf(child_identity, FileType::Regular, content_hash, sensitivity));
            }
        }

        if children.is_empty() && filter.has_include() && dir != root {
            return Ok(None);
        }
        Ok(Some(Snapshot::node(identity, children, sensitivity)))
    }

    /// Flattened walk used by `NameOnly` and `None`.
    fn collect_leaves(
        &self,
        dir: &Path,
        rel: &str,
        sensitivity: PathSensitivity,
        filter: &CompiledFilter,
        leaves: &mut Vec<Snapshot>,
    ) -> Result<()> {
        for path in self.fs.read_dir(dir)? {
            let child_rel = join_rel(rel, &path)?;
            if self.fs.is_dir(&path) {
                if !filter.excludes_dir(&child_rel) {
                    self.collect_leaves(&path, &child_rel, sensitivity, filter, leaves)?;
                }
            } else if self.fs.is_file(&path) && filter.matches_file(&child_rel) {
                let identity = match sensitivity {
                    PathSensitivity::NameOnly => file_name(&path)?,
                    _ => String::new(),
                };
                let content_hash = compute_file_hash(self.fs.as_ref(), &path)?;
                leaves.push(Snapshot::leaf(identity, FileType::Regular, content_hash, sensitivity));
            }
        }
        Ok(())
    }
}

/// Identity of the property root itself.
fn root_identity(root: &Path, sensitivity: PathSensitivity, is_file: bool) -> String {
    match sensitivity {
        PathSensitivity::Absolute => path_string(root),
        PathSensitivity::Relative | PathSensitivity::NameOnly if is_file => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("path has no file name: {:?}", path))
}

fn join_rel(rel: &str, path: &Path) -> Result<String> {
    let name = file_name(path)?;
    Ok(if rel.is_empty() {
        name
    } else {
        format!("{rel}/{name}")
    })
}

fn hash_scalar(hasher: &mut CompositeHasher, value: &ScalarValue) {
    match value {
        ScalarValue::Null => {
            hasher.tag(0);
        }
        ScalarValue::Bool(b) => {
            hasher.tag(1).tag(u8::from(*b));
        }
        ScalarValue::Int(i) => {
            hasher.tag(2).u64(*i as u64);
        }
        ScalarValue::Str(s) => {
            hasher.tag(3).str(s);
        }
        ScalarValue::List(items) => {
            hasher.tag(4).u64(items.len() as u64);
            for item in items {
                hash_scalar(hasher, item);
            }
        }
        ScalarValue::Map(entries) => {
            hasher.tag(5).u64(entries.len() as u64);
            for (key, item) in entries {
                hasher.str(key);
                hash_scalar(hasher, item);
            }
        }
    }
}
