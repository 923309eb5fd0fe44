use std::str::FromStr;

use serde::Deserialize;

/// What the scheduler does once a task fails.
///
/// - `FailFast`: stop submitting newly ready tasks, let running ones finish
///   (default behaviour). Finalizers still run.
/// - `Continue`: keep scheduling everything that does not depend on the
///   failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    FailFast,
    Continue,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::FailFast
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-fast" | "failfast" => Ok(FailurePolicy::FailFast),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(format!(
                "invalid failure_policy: {other} (expected \"fail-fast\" or \"continue\")"
            )),
        }
    }
}

/// Where execution records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStorageMode {
    /// One record file per task under the history directory.
    File,
    /// In memory only (lost when the process exits).
    Memory,
}

impl Default for HistoryStorageMode {
    fn default() -> Self {
        HistoryStorageMode::File
    }
}
