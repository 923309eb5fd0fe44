// src/snapshot/hash.rs

//! Content hashing primitives.
//!
//! Everything the engine hashes goes through blake3: file contents, scalar
//! property values, snapshot trees and cache keys.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fs::FileSystem;

/// A 32-byte blake3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash a byte slice directly.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Hash({})", &hex[..12])
    }
}

impl FromStr for Hash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        blake3::Hash::from_hex(s.trim())
            .map(|h| Hash(*h.as_bytes()))
            .map_err(|e| format!("invalid hash '{s}': {e}"))
    }
}

/// Incremental hasher for composite values.
///
/// Variable-length fields are length-prefixed so that `("ab", "c")` and
/// `("a", "bc")` never collide.
pub struct CompositeHasher {
    inner: blake3::Hasher,
}

impl CompositeHasher {
    /// Start a hasher whose output is specific to `domain`.
    pub fn new(domain: &str) -> Self {
        let mut hasher = Self {
            inner: blake3::Hasher::new(),
        };
        hasher.str(domain);
        hasher
    }

    pub fn tag(&mut self, tag: u8) -> &mut Self {
        self.inner.update(&[tag]);
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(&value.to_le_bytes());
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.u64(data.len() as u64);
        self.inner.update(data);
        self
    }

    pub fn str(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes())
    }

    pub fn hash(&mut self, hash: &Hash) -> &mut Self {
        self.inner.update(hash.as_bytes());
        self
    }

    pub fn finish(&self) -> Hash {
        Hash(*self.inner.finalize().as_bytes())
    }
}

/// Hash everything a reader yields.
pub fn hash_reader(mut reader: impl Read) -> std::io::Result<Hash> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Hash(*hasher.finalize().as_bytes()))
}

/// Compute the hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<Hash> {
    let reader = fs.open_read(path)?;
    hash_reader(reader).with_context(|| format!("reading file for hashing: {:?}", path))
}
