// src/snapshot/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Paths every tree walk ignores: VCS metadata and editor/OS droppings.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git",
    "**/.svn",
    "**/.hg",
    "**/CVS",
    "**/.DS_Store",
    "**/*~",
    "**/#*#",
    "**/.#*",
    "**/._*",
];

/// Include/exclude globs declared on a file-tree property.
///
/// Patterns are matched against paths relative to the property root, using
/// `/` as separator:
///
/// ```toml
/// include = ["src/**/*.rs"]
/// exclude = ["src/generated/**"]
/// ```
///
/// An empty `include` list means "every file".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl PathFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// A [`PathFilter`] compiled into glob sets, with the default excludes merged in.
#[derive(Clone)]
pub struct CompiledFilter {
    include_set: Option<GlobSet>,
    exclude_set: GlobSet,
}

impl fmt::Debug for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFilter")
            .field("has_include", &self.include_set.is_some())
            .finish_non_exhaustive()
    }
}

impl CompiledFilter {
    pub fn compile(filter: &PathFilter) -> Result<Self> {
        let include_set = if filter.include.is_empty() {
            None
        } else {
            Some(build_globset(&filter.include).context("building include globset")?)
        };

        let mut exclude: Vec<String> = DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect();
        exclude.extend(filter.exclude.iter().cloned());
        let exclude_set = build_globset(&exclude).context("building exclude globset")?;

        Ok(Self {
            include_set,
            exclude_set,
        })
    }

    /// Whether a file at `rel_path` (relative to the walk root) is part of the tree.
    pub fn matches_file(&self, rel_path: &str) -> bool {
        if self.exclude_set.is_match(rel_path) {
            return false;
        }
        match &self.include_set {
            Some(include) => include.is_match(rel_path),
            None => true,
        }
    }

    pub fn has_include(&self) -> bool {
        self.include_set.is_some()
    }

    /// Whether a directory should be pruned from the walk entirely.
    ///
    /// Include patterns never prune directories; only excludes do.
    pub fn excludes_dir(&self, rel_path: &str) -> bool {
        self.exclude_set.is_match(rel_path)
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
