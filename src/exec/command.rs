// src/exec/command.rs

//! Shell command actions.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::action::{Action, ActionContext};

/// Runs a shell command (`sh -c` / `cmd /C`).
///
/// The implementation id is the command text, so editing the command
/// invalidates previous executions. The child is killed when the build is
/// cancelled.
#[derive(Debug, Clone)]
pub struct CommandAction {
    cmd: String,
    working_dir: Option<PathBuf>,
}

impl CommandAction {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            working_dir: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    async fn run(&self, ctx: &ActionContext) -> Result<()> {
        info!(task = %ctx.task_path(), cmd = %self.cmd, "starting task process");

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (name, path) in ctx.outputs() {
            cmd.env(format!("KILN_OUTPUT_{}", name.to_uppercase()), path);
        }

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", ctx.task_path()))?;

        // Always consume both streams so buffers don't fill; log at debug.
        for stream in [
            child.stdout.take().map(|s| Box::new(s) as Box<dyn tokio::io::AsyncRead + Send + Unpin>),
            child.stderr.take().map(|s| Box::new(s) as Box<dyn tokio::io::AsyncRead + Send + Unpin>),
        ]
        .into_iter()
        .flatten()
        {
            let task_path = ctx.task_path().to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stream).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %task_path, "output: {}", line);
                }
            });
        }

        tokio::select! {
            status_res = child.wait() => {
                let status = status_res.with_context(|| {
                    format!("waiting for process of task '{}'", ctx.task_path())
                })?;
                let code = status.code().unwrap_or(-1);
                info!(
                    task = %ctx.task_path(),
                    exit_code = code,
                    success = status.success(),
                    "task process exited"
                );
                if !status.success() {
                    bail!("command `{}` exited with code {}", self.cmd, code);
                }
                Ok(())
            }
            _ = ctx.cancellation().cancelled() => {
                info!(task = %ctx.task_path(), "killing task process (build cancelled)");
                let _ = child.kill().await;
                Err(anyhow!("command `{}` was interrupted", self.cmd))
            }
        }
    }
}

impl Action for CommandAction {
    fn implementation_id(&self) -> String {
        format!("command:{}", self.cmd)
    }

    fn execute(&self, ctx: &ActionContext) -> Result<()> {
        // Actions run on blocking worker threads, which may still drive the
        // build's runtime through its handle.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.block_on(self.run(ctx)),
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("building runtime for command action")?
                .block_on(self.run(ctx)),
        }
    }
}
