//! Test actions that record what ran.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use kiln::exec::{Action, ActionContext};

/// Shared, ordered log of executed task paths.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, task: &str) {
        self.entries.lock().unwrap().push(task.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, task: &str) -> usize {
        self.entries.lock().unwrap().iter().filter(|t| *t == task).count()
    }

    pub fn position(&self, task: &str) -> Option<usize> {
        self.entries.lock().unwrap().iter().position(|t| t == task)
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Records its execution and succeeds.
pub struct RecordingAction {
    id: String,
    log: ExecutionLog,
    delay: Option<Duration>,
}

impl RecordingAction {
    pub fn new(id: impl Into<String>, log: &ExecutionLog) -> Self {
        Self {
            id: id.into(),
            log: log.clone(),
            delay: None,
        }
    }

    /// Sleep for `delay` before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<dyn Action> {
        Arc::new(self)
    }
}

impl Action for RecordingAction {
    fn implementation_id(&self) -> String {
        self.id.clone()
    }

    fn execute(&self, ctx: &ActionContext) -> anyhow::Result<()> {
        self.log.record(ctx.task_path());
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        Ok(())
    }
}

/// Records its execution and fails with `message`.
pub struct FailingAction {
    id: String,
    log: ExecutionLog,
    message: String,
}

impl FailingAction {
    pub fn new(id: impl Into<String>, log: &ExecutionLog, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            log: log.clone(),
            message: message.into(),
        }
    }

    pub fn shared(self) -> Arc<dyn Action> {
        Arc::new(self)
    }
}

impl Action for FailingAction {
    fn implementation_id(&self) -> String {
        self.id.clone()
    }

    fn execute(&self, ctx: &ActionContext) -> anyhow::Result<()> {
        self.log.record(ctx.task_path());
        bail!("{}", self.message)
    }
}

/// Copies the file at `source` into the output property `output`, upper-cased.
pub struct TransformAction {
    id: String,
    log: ExecutionLog,
    source: PathBuf,
    output: String,
}

impl TransformAction {
    pub fn new(
        id: impl Into<String>,
        log: &ExecutionLog,
        source: impl Into<PathBuf>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            log: log.clone(),
            source: source.into(),
            output: output.into(),
        }
    }

    pub fn shared(self) -> Arc<dyn Action> {
        Arc::new(self)
    }
}

impl Action for TransformAction {
    fn implementation_id(&self) -> String {
        self.id.clone()
    }

    fn execute(&self, ctx: &ActionContext) -> anyhow::Result<()> {
        self.log.record(ctx.task_path());
        let content = fs::read_to_string(&self.source)
            .with_context(|| format!("reading {}", self.source.display()))?;
        let target = ctx
            .output(&self.output)
            .ok_or_else(|| anyhow!("no output named {}", self.output))?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, content.to_uppercase())?;
        Ok(())
    }
}

/// Writes a fixed set of files below the directory output `output`.
pub struct TreeWriterAction {
    id: String,
    log: ExecutionLog,
    output: String,
    files: Vec<(String, Vec<u8>)>,
}

impl TreeWriterAction {
    pub fn new(id: impl Into<String>, log: &ExecutionLog, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            log: log.clone(),
            output: output.into(),
            files: Vec::new(),
        }
    }

    pub fn file(mut self, relative: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((relative.into(), content.into()));
        self
    }

    pub fn shared(self) -> Arc<dyn Action> {
        Arc::new(self)
    }
}

impl Action for TreeWriterAction {
    fn implementation_id(&self) -> String {
        self.id.clone()
    }

    fn execute(&self, ctx: &ActionContext) -> anyhow::Result<()> {
        self.log.record(ctx.task_path());
        let root = ctx
            .output(&self.output)
            .ok_or_else(|| anyhow!("no output named {}", self.output))?;
        fs::create_dir_all(root)?;
        for (relative, content) in &self.files {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)?;
        }
        Ok(())
    }
}

/// Blocks until the build is cancelled (or `limit` elapses), then returns.
pub struct BlockingAction {
    log: ExecutionLog,
    limit: Duration,
}

impl BlockingAction {
    pub fn new(log: &ExecutionLog, limit: Duration) -> Self {
        Self {
            log: log.clone(),
            limit,
        }
    }

    pub fn shared(self) -> Arc<dyn Action> {
        Arc::new(self)
    }
}

impl Action for BlockingAction {
    fn implementation_id(&self) -> String {
        "test:blocking".to_string()
    }

    fn execute(&self, ctx: &ActionContext) -> anyhow::Result<()> {
        self.log.record(ctx.task_path());
        let step = Duration::from_millis(10);
        let mut waited = Duration::ZERO;
        while !ctx.is_cancelled() && waited < self.limit {
            thread::sleep(step);
            waited += step;
        }
        Ok(())
    }
}
