// src/cache/key.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::snapshot::hash::{CompositeHasher, Hash};
use crate::snapshot::InputFingerprint;

/// Hash identifying one implementation run with one exact set of inputs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(Hash);

impl CacheKey {
    pub fn from_hash(hash: Hash) -> Self {
        Self(hash)
    }

    pub fn hash(&self) -> Hash {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", &self.to_hex()[..12])
    }
}

impl FromStr for CacheKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(CacheKey)
    }
}

/// Derives a [`CacheKey`] from an implementation hash and input hashes.
///
/// Inputs are kept sorted by property name, so the key does not depend on
/// declaration order. Building a key is pure: no cache or history access.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    implementation_hash: Hash,
    inputs: BTreeMap<String, Hash>,
}

impl CacheKeyBuilder {
    pub fn new(implementation_hash: Hash) -> Self {
        Self {
            implementation_hash,
            inputs: BTreeMap::new(),
        }
    }

    pub fn input(mut self, name: impl Into<String>, hash: Hash) -> Self {
        self.inputs.insert(name.into(), hash);
        self
    }

    pub fn build(&self) -> CacheKey {
        let mut hasher = CompositeHasher::new("kiln-cache-key-v1");
        hasher
            .hash(&self.implementation_hash)
            .u64(self.inputs.len() as u64);
        for (name, hash) in &self.inputs {
            hasher.str(name).hash(hash);
        }
        CacheKey(hasher.finish())
    }

    pub fn from_fingerprint(fingerprint: &InputFingerprint) -> CacheKey {
        fingerprint
            .property_hashes()
            .fold(Self::new(fingerprint.implementation_hash), |builder, (name, hash)| {
                builder.input(name, hash)
            })
            .build()
    }
}

/// Implementation hash of an action's implementation id.
pub fn implementation_hash(implementation_id: &str) -> Hash {
    CompositeHasher::new("kiln-implementation")
        .str(implementation_id)
        .finish()
}
