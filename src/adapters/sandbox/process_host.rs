//! Subprocess execution host.
//!
//! Every session is a new child process running this crate's binary in
//! `task-host` mode. The child starts with an empty environment, a
//! scratch working directory and no stderr, reads one request line from
//! stdin and writes one response line to stdout.
//!
//! Teardown kills and reaps the child. `kill_on_drop` backs this up if a
//! session is dropped without teardown.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::ports::{
    ExecutionHost, HostEvent, HostLaunchError, HostRequest, HostResponse, HostSession,
};

use super::script_engine::SandboxLimits;

/// Subcommand the child is started with.
pub const TASK_HOST_SUBCOMMAND: &str = "task-host";

/// Launches a fresh child process per session.
#[derive(Debug, Clone)]
pub struct ProcessHost {
    program: PathBuf,
    limits: SandboxLimits,
}

impl ProcessHost {
    /// Host running `program task-host`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            limits: SandboxLimits::default(),
        }
    }

    /// Host running the currently executing binary.
    pub fn current_exe() -> Result<Self, HostLaunchError> {
        std::env::current_exe()
            .map(Self::new)
            .map_err(|e| HostLaunchError(format!("cannot locate server binary: {}", e)))
    }

    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(TASK_HOST_SUBCOMMAND)
            .arg("--max-operations")
            .arg(self.limits.max_operations.to_string())
            .arg("--max-call-levels")
            .arg(self.limits.max_call_levels.to_string())
            .arg("--max-expr-depth")
            .arg(self.limits.max_expr_depth.to_string())
            .arg("--max-string-size")
            .arg(self.limits.max_string_size.to_string())
            .arg("--max-array-size")
            .arg(self.limits.max_array_size.to_string())
            .arg("--max-map-size")
            .arg(self.limits.max_map_size.to_string())
            .env_clear()
            .current_dir(std::env::temp_dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ExecutionHost for ProcessHost {
    async fn launch(&self) -> Result<Box<dyn HostSession>, HostLaunchError> {
        let mut child = self
            .command()
            .spawn()
            .map_err(|e| HostLaunchError(format!("{}: {}", self.program.display(), e)))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| HostLaunchError("child stdout was not captured".to_string()))?;

        tracing::trace!(pid = ?child.id(), "Launched task host process");

        Ok(Box::new(ProcessSession {
            child,
            stdin,
            stdout,
            reaped: false,
        }))
    }
}

struct ProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    reaped: bool,
}

#[async_trait]
impl HostSession for ProcessSession {
    async fn send(&mut self, request: &HostRequest) -> Result<(), String> {
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| "host already received a request".to_string())?;

        let mut line = serde_json::to_vec(request).map_err(|e| e.to_string())?;
        line.push(b'\n');

        stdin
            .write_all(&line)
            .await
            .map_err(|e| format!("failed to write to host: {}", e))?;
        stdin
            .flush()
            .await
            .map_err(|e| format!("failed to flush host input: {}", e))?;
        // stdin dropped here so the host sees end of input
        Ok(())
    }

    async fn next_event(&mut self) -> HostEvent {
        let mut line = String::new();
        match self.stdout.read_line(&mut line).await {
            Ok(0) => match self.child.wait().await {
                Ok(status) => {
                    self.reaped = true;
                    HostEvent::Exit(status.code())
                }
                Err(e) => HostEvent::Error(format!("failed to collect host exit status: {}", e)),
            },
            Ok(_) => match serde_json::from_str::<HostResponse>(line.trim_end()) {
                Ok(response) => HostEvent::Message(response),
                Err(e) => HostEvent::Error(format!("malformed host response: {}", e)),
            },
            Err(e) => HostEvent::Error(format!("failed to read from host: {}", e)),
        }
    }

    async fn teardown(&mut self) {
        self.stdin = None;
        if self.reaped {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            tracing::trace!(error = %e, "Task host already gone");
        }
        match self.child.wait().await {
            Ok(status) => tracing::trace!(?status, "Reaped task host process"),
            Err(e) => tracing::warn!(error = %e, "Failed to reap task host process"),
        }
        self.reaped = true;
    }

    fn is_alive(&self) -> bool {
        !self.reaped
    }
}
