// src/cache/entry.rs

//! Cache entry wire format.
//!
//! ```text
//! "KILNCE01" | u32 LE manifest length | CBOR manifest | blob
//! ```
//!
//! The blob is the concatenation of every regular file's bytes in manifest
//! order. Each root is unpacked independently into its own destination.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::key::CacheKey;
use super::CacheError;

pub const MAGIC: &[u8; 8] = b"KILNCE01";

/// Where and how an entry was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOrigin {
    pub task_path: String,
    pub created_at_ms: u64,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootKind {
    Missing,
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// `/`-separated path below the root; empty for a single-file root and
    /// for a directory root's own entry.
    pub relative_path: String,
    pub kind: EntryKind,
    pub permissions: u32,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootManifest {
    pub name: String,
    pub kind: RootKind,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub key: CacheKey,
    pub origin: EntryOrigin,
    pub roots: Vec<RootManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub manifest: Manifest,
    pub blob: Vec<u8>,
}

/// Counts reported after unpacking.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnpackStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

impl CacheEntry {
    /// Pack the named output roots into an entry.
    pub fn pack(
        key: CacheKey,
        origin: EntryOrigin,
        roots: &BTreeMap<String, PathBuf>,
    ) -> Result<Self, CacheError> {
        let mut blob = Vec::new();
        let mut manifests = Vec::with_capacity(roots.len());

        for (name, root) in roots {
            let meta = match fs::metadata(root) {
                Ok(meta) => Some(meta),
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => return Err(CacheError::io(root, e)),
            };

            let manifest = match meta {
                None => RootManifest {
                    name: name.clone(),
                    kind: RootKind::Missing,
                    entries: Vec::new(),
                },
                Some(meta) if meta.is_file() => {
                    let entry = pack_file(root, "", &meta, &mut blob)?;
                    RootManifest {
                        name: name.clone(),
                        kind: RootKind::File,
                        entries: vec![entry],
                    }
                }
                Some(meta) => {
                    // The root itself comes first, under the empty path.
                    let mut entries = vec![ManifestEntry {
                        relative_path: String::new(),
                        kind: EntryKind::Directory,
                        permissions: permissions_of(&meta),
                        size: 0,
                    }];
                    pack_dir(root, "", &mut entries, &mut blob)?;
                    RootManifest {
                        name: name.clone(),
                        kind: RootKind::Directory,
                        entries,
                    }
                }
            };
            manifests.push(manifest);
        }

        Ok(Self {
            manifest: Manifest {
                key,
                origin,
                roots: manifests,
            },
            blob,
        })
    }

    pub fn key(&self) -> CacheKey {
        self.manifest.key
    }

    /// Recreate every root at its destination, replacing whatever is there.
    pub fn unpack(&self, destinations: &BTreeMap<String, PathBuf>) -> Result<UnpackStats, CacheError> {
        let expected: u64 = self
            .manifest
            .roots
            .iter()
            .flat_map(|r| r.entries.iter())
            .filter(|e| e.kind == EntryKind::File)
            .map(|e| e.size)
            .sum();
        if expected != self.blob.len() as u64 {
            return Err(CacheError::Corrupt(format!(
                "manifest describes {expected} bytes but blob holds {}",
                self.blob.len()
            )));
        }

        for name in destinations.keys() {
            if !self.manifest.roots.iter().any(|r| &r.name == name) {
                return Err(CacheError::UnknownRoot(name.clone()));
            }
        }

        let mut stats = UnpackStats::default();
        let mut offset = 0usize;
        for root in &self.manifest.roots {
            let dest = destinations
                .get(&root.name)
                .ok_or_else(|| CacheError::MissingDestination(root.name.clone()))?;
            remove_existing(dest)?;

            match root.kind {
                RootKind::Missing => {}
                RootKind::File => {
                    let entry = root.entries.first().ok_or_else(|| {
                        CacheError::Corrupt(format!("file root '{}' has no entry", root.name))
                    })?;
                    if let Some(parent) = dest.parent() {
                        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
                    }
                    offset = self.write_file(dest, entry, offset)?;
                    stats.files += 1;
                    stats.bytes += entry.size;
                }
                RootKind::Directory => {
                    fs::create_dir_all(dest).map_err(|e| CacheError::io(dest, e))?;
                    let mut dirs = Vec::new();
                    for entry in &root.entries {
                        if entry.relative_path.is_empty() && entry.kind == EntryKind::Directory {
                            dirs.push((dest.clone(), entry.permissions));
                            continue;
                        }
                        let target = safe_join(dest, &entry.relative_path)?;
                        match entry.kind {
                            EntryKind::Directory => {
                                fs::create_dir_all(&target).map_err(|e| CacheError::io(&target, e))?;
                                dirs.push((target, entry.permissions));
                                stats.directories += 1;
                            }
                            EntryKind::File => {
                                offset = self.write_file(&target, entry, offset)?;
                                stats.files += 1;
                                stats.bytes += entry.size;
                            }
                        }
                    }
                    // Deepest first, so a read-only directory never blocks its children.
                    for (dir, mode) in dirs.into_iter().rev() {
                        set_permissions(&dir, mode).map_err(|e| CacheError::io(&dir, e))?;
                    }
                }
            }
        }

        debug!(
            key = %self.manifest.key,
            files = stats.files,
            bytes = stats.bytes,
            "unpacked cache entry"
        );
        Ok(stats)
    }

    fn write_file(&self, target: &Path, entry: &ManifestEntry, offset: usize) -> Result<usize, CacheError> {
        let end = offset + entry.size as usize;
        let data = self
            .blob
            .get(offset..end)
            .ok_or_else(|| CacheError::Corrupt("blob shorter than manifest".to_string()))?;
        fs::write(target, data).map_err(|e| CacheError::io(target, e))?;
        set_permissions(target, entry.permissions).map_err(|e| CacheError::io(target, e))?;
        Ok(end)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        let mut manifest = Vec::new();
        ciborium::into_writer(&self.manifest, &mut manifest)
            .map_err(|e| CacheError::Corrupt(format!("encoding manifest: {e}")))?;
        let len = u32::try_from(manifest.len())
            .map_err(|_| CacheError::Corrupt("manifest too large".to_string()))?;

        let mut out = Vec::with_capacity(MAGIC.len() + 4 + manifest.len() + self.blob.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&manifest);
        out.extend_from_slice(&self.blob);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        let header = MAGIC.len() + 4;
        if bytes.len() < header || &bytes[..MAGIC.len()] != MAGIC {
            return Err(CacheError::Corrupt("bad magic".to_string()));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[MAGIC.len()..header]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let manifest_bytes = bytes
            .get(header..header + len)
            .ok_or_else(|| CacheError::Corrupt("truncated manifest".to_string()))?;
        let manifest: Manifest = ciborium::from_reader(manifest_bytes)
            .map_err(|e| CacheError::Corrupt(format!("decoding manifest: {e}")))?;
        Ok(Self {
            manifest,
            blob: bytes[header + len..].to_vec(),
        })
    }
}

fn pack_file(path: &Path, rel: &str, meta: &fs::Metadata, blob: &mut Vec<u8>) -> Result<ManifestEntry, CacheError> {
    let data = fs::read(path).map_err(|e| CacheError::io(path, e))?;
    let entry = ManifestEntry {
        relative_path: rel.to_string(),
        kind: EntryKind::File,
        permissions: permissions_of(meta),
        size: data.len() as u64,
    };
    blob.extend_from_slice(&data);
    Ok(entry)
}

/// Depth-first, name-sorted walk; directories precede their contents.
fn pack_dir(
    dir: &Path,
    rel: &str,
    entries: &mut Vec<ManifestEntry>,
    blob: &mut Vec<u8>,
) -> Result<(), CacheError> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| CacheError::io(dir, e))?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<_>>()
        .map_err(|e| CacheError::io(dir, e))?;
    children.sort();

    for child in children {
        let name = child
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let child_rel = if rel.is_empty() {
            name
        } else {
            format!("{rel}/{name}")
        };
        let meta = fs::metadata(&child).map_err(|e| CacheError::io(&child, e))?;
        if meta.is_dir() {
            entries.push(ManifestEntry {
                relative_path: child_rel.clone(),
                kind: EntryKind::Directory,
                permissions: permissions_of(&meta),
                size: 0,
            });
            pack_dir(&child, &child_rel, entries, blob)?;
        } else if meta.is_file() {
            entries.push(pack_file(&child, &child_rel, &meta, blob)?);
        }
    }
    Ok(())
}

fn safe_join(root: &Path, rel: &str) -> Result<PathBuf, CacheError> {
    if rel.is_empty() || rel.split('/').any(|c| c.is_empty() || c == "." || c == "..") {
        return Err(CacheError::Corrupt(format!("invalid entry path '{rel}'")));
    }
    Ok(root.join(rel))
}

fn remove_existing(dest: &Path) -> Result<(), CacheError> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dest).map_err(|e| CacheError::io(dest, e)),
        Ok(_) => fs::remove_file(dest).map_err(|e| CacheError::io(dest, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(dest, e)),
    }
}

#[cfg(unix)]
fn permissions_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permissions_of(meta: &fs::Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_permissions(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}
