// src/history/record.rs

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::snapshot::{InputFingerprint, OutputFingerprint};

/// Bumped whenever the serialized layout changes; older records are ignored.
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Executed,
    FromCache,
    Failed,
}

/// What the engine remembers about a task's last execution.
///
/// Records are only ever replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub version: u32,
    pub task_path: String,
    pub cache_key: Option<CacheKey>,
    /// `None` when some input could not be read.
    pub input_fingerprint: Option<InputFingerprint>,
    pub output_fingerprint: OutputFingerprint,
    pub outcome: ExecutionOutcome,
    pub recorded_at_ms: u64,
}

impl ExecutionRecord {
    pub fn new(
        task_path: impl Into<String>,
        cache_key: Option<CacheKey>,
        input_fingerprint: Option<InputFingerprint>,
        output_fingerprint: OutputFingerprint,
        outcome: ExecutionOutcome,
    ) -> Self {
        Self {
            version: RECORD_VERSION,
            task_path: task_path.into(),
            cache_key,
            input_fingerprint,
            output_fingerprint,
            outcome,
            recorded_at_ms: now_ms(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome != ExecutionOutcome::Failed
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
