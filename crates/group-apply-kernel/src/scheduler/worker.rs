//! Worker pipe: one external process per group.
//!
//! The process gets piped stdin and stdout and inherits stderr, so a
//! worker's own complaints reach the user directly. Children are spawned
//! with `kill_on_drop`, so abandoning a group (cancellation, fatal error)
//! never leaves a worker running.

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::config::WorkerCommand;
use crate::error::{Error, Result};

use super::group::GroupId;

/// A freshly spawned worker with both pipe ends still attached.
#[derive(Debug)]
pub struct WorkerPipe {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub process: WorkerProcess,
}

/// The process half of a worker, kept to wait for or kill it.
#[derive(Debug)]
pub struct WorkerProcess {
    ordinal: GroupId,
    child: Child,
}

impl WorkerPipe {
    /// Spawn `command` for group `ordinal`.
    ///
    /// Spawning is synchronous with the caller so a slow-starting worker for
    /// one group overlaps the processing of the previous one.
    pub fn spawn(ordinal: GroupId, command: &WorkerCommand) -> Result<Self> {
        let spawn_error = |source: io::Error| Error::Spawn {
            ordinal,
            program: command.program.clone(),
            source,
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(spawn_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(io::Error::other("stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(io::Error::other("stdout not captured")))?;

        tracing::debug!(group = %ordinal, pid = ?child.id(), "spawned worker: {command}");

        Ok(Self {
            stdin,
            stdout,
            process: WorkerProcess { ordinal, child },
        })
    }
}

impl WorkerProcess {
    pub fn ordinal(&self) -> GroupId {
        self.ordinal
    }

    /// Wait for the worker to exit and return its status code.
    pub async fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait().await?;
        let code = exit_code(status);
        tracing::debug!(group = %self.ordinal, code, "worker exited");
        Ok(code)
    }

    /// Kill the worker and reap it.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(group = %self.ordinal, "failed to kill worker: {e}");
        }
    }
}

/// Exit code, or `128 + signal` for a worker killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            128 + status.signal().unwrap_or(0)
        }
        #[cfg(not(unix))]
        {
            -1
        }
    })
}
