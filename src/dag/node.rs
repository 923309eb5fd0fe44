// src/dag/node.rs

//! Task node descriptors as handed to the engine by the configuration phase.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::exec::action::Action;
use crate::snapshot::patterns::PathFilter;

/// Which kind of edge referenced a node; used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    DependsOn,
    MustRunAfter,
    ShouldRunAfter,
    FinalizedBy,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::DependsOn => "dependsOn",
            EdgeKind::MustRunAfter => "mustRunAfter",
            EdgeKind::ShouldRunAfter => "shouldRunAfter",
            EdgeKind::FinalizedBy => "finalizedBy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyRole {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Scalar,
    File,
    FileTree,
}

/// How much of a file's location participates in its snapshot identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSensitivity {
    /// Full path of each file.
    Absolute,
    /// Path relative to the property root.
    Relative,
    /// File name only.
    NameOnly,
    /// Content only.
    None,
}

impl PathSensitivity {
    pub(crate) fn tag(self) -> u8 {
        match self {
            PathSensitivity::Absolute => 1,
            PathSensitivity::Relative => 2,
            PathSensitivity::NameOnly => 3,
            PathSensitivity::None => 4,
        }
    }
}

/// A scalar property value, hashed with type tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<ScalarValue>),
    Map(BTreeMap<String, ScalarValue>),
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::Str(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::Str(s)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Scalar(ScalarValue),
    Path { path: PathBuf, filter: PathFilter },
}

/// A declared input or output property of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub role: PropertyRole,
    pub kind: ValueKind,
    pub sensitivity: PathSensitivity,
    pub value: PropertyValue,
}

impl PropertyDescriptor {
    pub fn scalar(name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        Self {
            name: name.into(),
            role: PropertyRole::Input,
            kind: ValueKind::Scalar,
            sensitivity: PathSensitivity::None,
            value: PropertyValue::Scalar(value.into()),
        }
    }

    pub fn input_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::path(name, PropertyRole::Input, ValueKind::File, path)
    }

    pub fn input_tree(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::path(name, PropertyRole::Input, ValueKind::FileTree, path)
    }

    pub fn output_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::path(name, PropertyRole::Output, ValueKind::File, path)
    }

    pub fn output_tree(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::path(name, PropertyRole::Output, ValueKind::FileTree, path)
    }

    fn path(
        name: impl Into<String>,
        role: PropertyRole,
        kind: ValueKind,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            kind,
            sensitivity: PathSensitivity::Relative,
            value: PropertyValue::Path {
                path: path.into(),
                filter: PathFilter::default(),
            },
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: PathSensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Replace the include/exclude filter of a path property.
    pub fn with_filter(mut self, new_filter: PathFilter) -> Self {
        if let PropertyValue::Path { filter, .. } = &mut self.value {
            *filter = new_filter;
        }
        self
    }

    pub fn path_value(&self) -> Option<&PathBuf> {
        match &self.value {
            PropertyValue::Path { path, .. } => Some(path),
            PropertyValue::Scalar(_) => None,
        }
    }
}

/// One unit of work in the build.
#[derive(Clone)]
pub struct TaskNode {
    pub path: String,
    pub action: Arc<dyn Action>,
    pub inputs: Vec<PropertyDescriptor>,
    pub outputs: Vec<PropertyDescriptor>,
    pub depends_on: Vec<String>,
    pub must_run_after: Vec<String>,
    pub should_run_after: Vec<String>,
    pub finalized_by: Vec<String>,
    /// Named resources held exclusively while the action runs.
    pub exclusive_resources: Vec<String>,
    /// Whether outputs may be stored in and loaded from the build cache.
    pub cacheable: bool,
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("path", &self.path)
            .field("implementation", &self.action.implementation_id())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("depends_on", &self.depends_on)
            .field("must_run_after", &self.must_run_after)
            .field("should_run_after", &self.should_run_after)
            .field("finalized_by", &self.finalized_by)
            .field("exclusive_resources", &self.exclusive_resources)
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

impl TaskNode {
    pub fn new(path: impl Into<String>, action: Arc<dyn Action>) -> Self {
        Self {
            path: path.into(),
            action,
            inputs: Vec::new(),
            outputs: Vec::new(),
            depends_on: Vec::new(),
            must_run_after: Vec::new(),
            should_run_after: Vec::new(),
            finalized_by: Vec::new(),
            exclusive_resources: Vec::new(),
            cacheable: true,
        }
    }

    /// Add an input property (its role is forced to input).
    pub fn input(mut self, mut property: PropertyDescriptor) -> Self {
        property.role = PropertyRole::Input;
        self.inputs.push(property);
        self
    }

    /// Add an output property (its role is forced to output).
    pub fn output(mut self, mut property: PropertyDescriptor) -> Self {
        property.role = PropertyRole::Output;
        self.outputs.push(property);
        self
    }

    pub fn depends_on(mut self, path: impl Into<String>) -> Self {
        self.depends_on.push(path.into());
        self
    }

    pub fn must_run_after(mut self, path: impl Into<String>) -> Self {
        self.must_run_after.push(path.into());
        self
    }

    pub fn should_run_after(mut self, path: impl Into<String>) -> Self {
        self.should_run_after.push(path.into());
        self
    }

    pub fn finalized_by(mut self, path: impl Into<String>) -> Self {
        self.finalized_by.push(path.into());
        self
    }

    pub fn exclusive_resource(mut self, name: impl Into<String>) -> Self {
        self.exclusive_resources.push(name.into());
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Output roots by property name.
    pub fn output_paths(&self) -> BTreeMap<String, PathBuf> {
        self.outputs
            .iter()
            .filter_map(|p| p.path_value().map(|path| (p.name.clone(), path.clone())))
            .collect()
    }

    /// Edges of the given kind, as declared.
    pub fn edges(&self, kind: EdgeKind) -> &[String] {
        match kind {
            EdgeKind::DependsOn => &self.depends_on,
            EdgeKind::MustRunAfter => &self.must_run_after,
            EdgeKind::ShouldRunAfter => &self.should_run_after,
            EdgeKind::FinalizedBy => &self.finalized_by,
        }
    }
}
