// src/exec/task_runner.rs

//! The per-node pipeline run on a worker thread.
//!
//! snapshot inputs, decide, then one of:
//! - up to date: nothing to do
//! - from cache: unpack outputs, snapshot them, record
//! - execute: run the action, snapshot outputs, record, store in the cache

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use anyhow::anyhow;
use tracing::{info, warn};

use crate::cache::{CacheKey, CacheEntry, EntryOrigin};
use crate::dag::TaskNode;
use crate::engine::TaskOutcome;
use crate::history::record::now_ms;
use crate::history::{ExecutionOutcome, ExecutionRecord};
use crate::snapshot::{ChangeReason, OutputFingerprint};
use crate::uptodate::{Decision, TaskCheck, UpToDateChecker};

use super::action::ActionContext;
use super::cancel::Cancellation;

/// Run the whole pipeline for one node and report its outcome.
///
/// Never panics: action panics are caught and reported as failures.
pub fn run_node(
    node: &TaskNode,
    checker: &UpToDateChecker,
    cancellation: &Cancellation,
) -> TaskOutcome {
    if cancellation.is_cancelled() {
        return TaskOutcome::Failed("interrupted before start".to_string());
    }

    let mut check = checker.check(node);
    match check.decision.clone() {
        Decision::UpToDate => {
            info!(task = %node.path, "UP-TO-DATE");
            TaskOutcome::UpToDate
        }
        Decision::FromCache { key } => match restore_from_cache(node, checker, &mut check, key) {
            Ok(()) => {
                info!(task = %node.path, key = %key, "FROM-CACHE");
                TaskOutcome::FromCache
            }
            Err(err) => {
                warn!(task = %node.path, key = %key, error = %err, "cache restore failed; executing instead");
                execute(node, checker, check, cancellation, &[])
            }
        },
        Decision::Execute { reasons } => execute(node, checker, check, cancellation, &reasons),
    }
}

fn restore_from_cache(
    node: &TaskNode,
    checker: &UpToDateChecker,
    check: &mut TaskCheck,
    key: CacheKey,
) -> anyhow::Result<()> {
    let entry = check
        .cache_entry
        .take()
        .ok_or_else(|| anyhow!("cache hit without an entry"))?;
    let stats = entry.unpack(&node.output_paths())?;
    info!(
        task = %node.path,
        files = stats.files,
        directories = stats.directories,
        bytes = stats.bytes,
        "unpacked cached outputs"
    );

    let outputs = checker
        .snapshot_outputs(node)
        .map_err(|failed| anyhow!("restored outputs unreadable: {}", failed.join(", ")))?;
    let record = ExecutionRecord::new(
        &node.path,
        Some(key),
        check.inputs.fingerprint.clone(),
        outputs,
        ExecutionOutcome::FromCache,
    );
    write_record(checker, &record);
    Ok(())
}

fn execute(
    node: &TaskNode,
    checker: &UpToDateChecker,
    check: TaskCheck,
    cancellation: &Cancellation,
    reasons: &[ChangeReason],
) -> TaskOutcome {
    let why: Vec<String> = reasons.iter().map(ToString::to_string).collect();
    info!(task = %node.path, reasons = %why.join("; "), "EXECUTE");

    let ctx = ActionContext::new(node.path.clone(), node.output_paths(), cancellation.clone());
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| node.action.execute(&ctx)))
        .unwrap_or_else(|payload| Err(anyhow!("action panicked: {}", panic_message(&*payload))));
    let elapsed = started.elapsed();

    if cancellation.is_cancelled() {
        // Whatever the action produced is not trusted: no record, no cache entry.
        warn!(task = %node.path, "build cancelled while the action ran; discarding its outputs");
        return TaskOutcome::Failed("interrupted".to_string());
    }

    let TaskCheck {
        inputs, cache_key, ..
    } = check;

    if let Err(err) = result {
        let message = format!("{err:#}");
        warn!(task = %node.path, error = %message, "FAILED");
        let outputs = checker.snapshot_outputs(node).unwrap_or_default();
        let record = ExecutionRecord::new(
            &node.path,
            cache_key,
            inputs.fingerprint,
            outputs,
            ExecutionOutcome::Failed,
        );
        write_record(checker, &record);
        return TaskOutcome::Failed(message);
    }

    let (outputs, outputs_known) = match checker.snapshot_outputs(node) {
        Ok(outputs) => (outputs, true),
        Err(failed) => {
            warn!(task = %node.path, outputs = ?failed, "could not snapshot outputs; the next build will execute again");
            (OutputFingerprint::default(), false)
        }
    };

    let input_fingerprint = inputs.fingerprint.filter(|_| outputs_known);
    let record = ExecutionRecord::new(
        &node.path,
        cache_key,
        input_fingerprint,
        outputs,
        ExecutionOutcome::Executed,
    );
    write_record(checker, &record);

    if let Some(key) = cache_key.filter(|_| outputs_known) {
        store_in_cache(node, checker, key, elapsed.as_millis() as u64);
    }

    info!(task = %node.path, elapsed_ms = elapsed.as_millis() as u64, "EXECUTED");
    TaskOutcome::Executed
}

fn store_in_cache(node: &TaskNode, checker: &UpToDateChecker, key: CacheKey, execution_time_ms: u64) {
    if !node.cacheable || node.outputs.is_empty() || !checker.cache().is_enabled() {
        return;
    }
    let origin = EntryOrigin {
        task_path: node.path.clone(),
        created_at_ms: now_ms(),
        execution_time_ms,
    };
    match CacheEntry::pack(key, origin, &node.output_paths()) {
        Ok(entry) => checker.cache().store(&entry),
        Err(err) => warn!(task = %node.path, key = %key, error = %err, "failed to pack outputs for the cache"),
    }
}

fn write_record(checker: &UpToDateChecker, record: &ExecutionRecord) {
    if let Err(err) = checker.history().store(record) {
        warn!(task = %record.task_path, error = %err, "failed to write execution history");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
