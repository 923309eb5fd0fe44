// src/build.rs

//! High-level entry point for running one build over a validated graph.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::{BuildCacheStore, DirectoryRemoteBackend, LocalCacheStore, RemoteCache};
use crate::config::EngineConfig;
use crate::dag::{Scheduler, TaskGraph};
use crate::engine::{BuildOptions, CoreRuntime, Runtime, RuntimeEvent};
use crate::errors::Result;
use crate::exec::{Cancellation, WorkerPoolBackend};
use crate::fs::{FileSystem, RealFileSystem};
use crate::history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
use crate::report::BuildResult;
use crate::snapshot::Snapshotter;
use crate::types::HistoryStorageMode;
use crate::uptodate::UpToDateChecker;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Owns the stores shared by consecutive builds.
///
/// The history store and cache are explicit handles, so tests can run many
/// isolated engines side by side.
pub struct Engine {
    options: BuildOptions,
    history: Arc<dyn HistoryStore>,
    cache: Arc<BuildCacheStore>,
    fs: Arc<dyn FileSystem>,
}

impl Engine {
    pub fn new(
        options: BuildOptions,
        history: Arc<dyn HistoryStore>,
        cache: Arc<BuildCacheStore>,
    ) -> Self {
        Self {
            options,
            history,
            cache,
            fs: Arc::new(RealFileSystem),
        }
    }

    /// In-memory history and no cache.
    pub fn in_memory(options: BuildOptions) -> Self {
        Self::new(
            options,
            Arc::new(MemoryHistoryStore::new()),
            Arc::new(BuildCacheStore::disabled()),
        )
    }

    /// Wire the stores described by validated settings.
    pub fn from_config(config: &EngineConfig) -> Self {
        let history: Arc<dyn HistoryStore> = match config.history.storage {
            HistoryStorageMode::File => Arc::new(FileHistoryStore::new(&config.history.dir)),
            HistoryStorageMode::Memory => Arc::new(MemoryHistoryStore::new()),
        };
        Self::new(config.build_options(), history, Arc::new(cache_from_config(config)))
    }

    /// Snapshot through a different filesystem (e.g. a mock in tests).
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn cache(&self) -> &Arc<BuildCacheStore> {
        &self.cache
    }

    pub async fn run(&self, graph: TaskGraph) -> Result<BuildResult> {
        self.run_with_cancel(graph, Cancellation::new()).await
    }

    /// Run `graph` until every node is terminal.
    ///
    /// Cancelling `cancellation` stops dispatch immediately and asks running
    /// actions to stop; their outputs are neither recorded nor cached.
    pub async fn run_with_cancel(
        &self,
        graph: TaskGraph,
        cancellation: Cancellation,
    ) -> Result<BuildResult> {
        let graph = Arc::new(graph);
        let checker = UpToDateChecker::new(
            Snapshotter::new(Arc::clone(&self.fs)),
            Arc::clone(&self.history),
            Arc::clone(&self.cache),
        )
        .with_force_rerun(self.options.force_rerun.iter().cloned());

        // Runtime event channel.
        let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(EVENT_CHANNEL_CAPACITY);

        let executor = WorkerPoolBackend::new(
            Arc::clone(&graph),
            Arc::new(checker),
            cancellation.clone(),
            rt_tx.clone(),
        );

        // Cancellation → CancelRequested.
        let cancel_forwarder = {
            let tx = rt_tx.clone();
            let cancellation = cancellation.clone();
            tokio::spawn(async move {
                cancellation.cancelled().await;
                let _ = tx.send(RuntimeEvent::CancelRequested).await;
            })
        };
        drop(rt_tx);

        let scheduler = Scheduler::new(
            graph,
            self.options.failure_policy,
            self.options.max_parallelism,
        );
        let mut core = CoreRuntime::new(scheduler);
        if cancellation.is_cancelled() {
            // Halt before the first dispatch.
            core.step(RuntimeEvent::CancelRequested);
        }
        let runtime = Runtime::new(core, rt_rx, executor);
        let result = runtime.run().await;

        cancel_forwarder.abort();
        result
    }

    /// Like [`Engine::run`], with Ctrl-C cancelling the build.
    pub async fn run_until_interrupted(&self, graph: TaskGraph) -> Result<BuildResult> {
        let cancellation = Cancellation::new();
        let ctrl_c = {
            let cancellation = cancellation.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("interrupt received; cancelling build");
                        cancellation.cancel();
                    }
                    Err(e) => warn!(error = %e, "failed to listen for Ctrl+C"),
                }
            })
        };

        let result = self.run_with_cancel(graph, cancellation).await;
        ctrl_c.abort();
        result
    }
}

/// Build the cache store described by `config`.
pub fn cache_from_config(config: &EngineConfig) -> BuildCacheStore {
    let local = config.cache.local.as_ref().map(|local| {
        LocalCacheStore::new(&local.dir)
            .with_max_size(local.max_size)
            .with_max_age(local.max_age)
    });
    let remote = config.cache.remote.as_ref().map(|remote| {
        RemoteCache::new(
            Box::new(DirectoryRemoteBackend::new(&remote.dir)),
            remote.retry,
            remote.push,
        )
    });
    BuildCacheStore::new(local, remote)
}
