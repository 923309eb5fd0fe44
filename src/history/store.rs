// src/history/store.rs

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use super::record::{ExecutionRecord, RECORD_VERSION};
use super::HistoryError;
use crate::locks::KeyedLocks;
use crate::snapshot::Hash;

/// Abstract storage for execution records, keyed by task path.
///
/// A record that cannot be decoded is reported as absent: history problems
/// only ever cause extra work, never a failed build.
pub trait HistoryStore: Send + Sync {
    fn load(&self, task: &str) -> Result<Option<ExecutionRecord>, HistoryError>;
    fn store(&self, record: &ExecutionRecord) -> Result<(), HistoryError>;
    fn remove(&self, task: &str) -> Result<bool, HistoryError>;
    /// Remove records for tasks that are not in the `active_tasks` list.
    fn prune(&self, active_tasks: &[&str]) -> Result<usize, HistoryError>;
    fn task_paths(&self) -> Result<Vec<String>, HistoryError>;
}

/// One CBOR file per task under a directory.
///
/// File names are the blake3 hash of the task path, so any task path is a
/// valid key. Writes go to a temporary file first and are renamed into place.
#[derive(Debug)]
pub struct FileHistoryStore {
    dir: PathBuf,
    locks: KeyedLocks,
}

impl FileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, task: &str) -> PathBuf {
        self.dir
            .join(format!("{}.bin", Hash::of(task.as_bytes()).to_hex()))
    }

    fn read_record(&self, path: &Path) -> Result<Option<ExecutionRecord>, HistoryError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        match ciborium::from_reader::<ExecutionRecord, _>(bytes.as_slice()) {
            Ok(record) if record.version == RECORD_VERSION => Ok(Some(record)),
            Ok(record) => {
                warn!(
                    path = ?path,
                    version = record.version,
                    expected = RECORD_VERSION,
                    "ignoring execution record with unsupported version"
                );
                Ok(None)
            }
            Err(err) => {
                warn!(path = ?path, error = %err, "ignoring corrupt execution record");
                Ok(None)
            }
        }
    }

    fn record_files(&self) -> Result<Vec<PathBuf>, HistoryError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| HistoryError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "bin") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self, task: &str) -> Result<Option<ExecutionRecord>, HistoryError> {
        let record = self.read_record(&self.record_path(task))?;
        // A hash collision would hand back another task's record.
        Ok(record.filter(|r| r.task_path == task))
    }

    fn store(&self, record: &ExecutionRecord) -> Result<(), HistoryError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(record, &mut bytes).map_err(|e| HistoryError::Encode {
            task: record.task_path.clone(),
            message: e.to_string(),
        })?;

        let path = self.record_path(&record.task_path);
        let io_err = |source| HistoryError::Io {
            path: path.clone(),
            source,
        };
        self.locks.with_lock(&record.task_path, || {
            fs::create_dir_all(&self.dir).map_err(io_err)?;
            let tmp = path.with_extension(format!("{}.tmp", std::process::id()));
            let written = File::create(&tmp)
                .and_then(|mut f| f.write_all(&bytes).and_then(|()| f.sync_all()))
                .and_then(|()| fs::rename(&tmp, &path));
            if let Err(e) = written {
                let _ = fs::remove_file(&tmp);
                return Err(io_err(e));
            }
            Ok(())
        })?;

        debug!(
            task = %record.task_path,
            outcome = ?record.outcome,
            "stored execution record (file)"
        );
        Ok(())
    }

    fn remove(&self, task: &str) -> Result<bool, HistoryError> {
        let path = self.record_path(task);
        self.locks.with_lock(task, || match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(HistoryError::Io {
                path: path.clone(),
                source,
            }),
        })
    }

    fn prune(&self, active_tasks: &[&str]) -> Result<usize, HistoryError> {
        let mut removed = 0;
        for path in self.record_files()? {
            let keep = match self.read_record(&path)? {
                Some(record) => active_tasks.contains(&record.task_path.as_str()),
                None => false,
            };
            if !keep {
                fs::remove_file(&path).map_err(|source| HistoryError::Io {
                    path: path.clone(),
                    source,
                })?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "pruned stale execution records (file)");
        }
        Ok(removed)
    }

    fn task_paths(&self) -> Result<Vec<String>, HistoryError> {
        let mut paths = Vec::new();
        for file in self.record_files()? {
            if let Some(record) = self.read_record(&file)? {
                paths.push(record.task_path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Stores records in memory only.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    map: Mutex<HashMap<String, ExecutionRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, ExecutionRecord>> {
        self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self, task: &str) -> Result<Option<ExecutionRecord>, HistoryError> {
        Ok(self.map().get(task).cloned())
    }

    fn store(&self, record: &ExecutionRecord) -> Result<(), HistoryError> {
        self.map()
            .insert(record.task_path.clone(), record.clone());
        debug!(
            task = %record.task_path,
            outcome = ?record.outcome,
            "stored execution record (memory)"
        );
        Ok(())
    }

    fn remove(&self, task: &str) -> Result<bool, HistoryError> {
        Ok(self.map().remove(task).is_some())
    }

    fn prune(&self, active_tasks: &[&str]) -> Result<usize, HistoryError> {
        let mut map = self.map();
        let initial_len = map.len();
        map.retain(|k, _| active_tasks.contains(&k.as_str()));
        let removed = initial_len - map.len();
        if removed > 0 {
            info!(removed, "pruned stale execution records (memory)");
        }
        Ok(removed)
    }

    fn task_paths(&self) -> Result<Vec<String>, HistoryError> {
        let mut paths: Vec<String> = self.map().keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}
