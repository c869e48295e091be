//! Group lifecycle.
//!
//! Opening a group spawns its worker and starts three tasks: the feeder, the
//! drainer, and a supervisor that waits for the worker to exit. The result is
//! split in two halves with a single owner each:
//!
//! - [`GroupInput`] stays with the reader while the group is active.
//!   Dropping it (or calling [`GroupInput::close`]) is the end-of-input signal.
//! - [`GroupOutput`] goes onto the sequencer's backlog at once, so output is
//!   ordered by creation, not completion.
//!
//! The worker deadline is enforced by the supervisor, counted from spawn, and
//! covers only the worker process. How long the sequencer takes to reach the
//! group does not count against it.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{PipelineConfig, WorkerCommand};
use crate::diagnostics::Diagnostic;
use crate::error::Result;

use super::drainer::drain;
use super::feeder::feed;
use super::queue::{line_queue, Line, LineReceiver, LineSender};
use super::worker::{WorkerPipe, WorkerProcess};

/// How long the drainer keeps reading after a timed-out worker is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Creation ordinal of a group, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-group resource settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupSettings {
    pub queue_capacity: Option<usize>,
    pub timeout: Option<Duration>,
}

impl From<&PipelineConfig> for GroupSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            timeout: config.worker_timeout(),
        }
    }
}

/// How the supervisor saw the worker end.
#[derive(Debug)]
enum WorkerStatus {
    Exited(io::Result<i32>),
    TimedOut,
}

/// Reader-side half of an open group.
#[derive(Debug)]
pub struct GroupInput {
    id: GroupId,
    lines: LineSender,
}

/// Sequencer-side half of a group.
///
/// Dropping it before [`reap`](Self::reap) aborts the group's tasks, which
/// kills the worker.
#[derive(Debug)]
pub struct GroupOutput {
    id: GroupId,
    lines: LineReceiver,
    feeder: Option<JoinHandle<io::Result<u64>>>,
    drainer: Option<JoinHandle<io::Result<u64>>>,
    supervisor: Option<JoinHandle<WorkerStatus>>,
    timeout: Option<Duration>,
}

/// Spawn the worker for group `id` and start its tasks.
///
/// Must be called from within a tokio runtime.
pub fn open_group(
    id: GroupId,
    command: &WorkerCommand,
    settings: &GroupSettings,
) -> Result<(GroupInput, GroupOutput)> {
    let WorkerPipe {
        stdin,
        stdout,
        process,
    } = WorkerPipe::spawn(id, command)?;
    let deadline = settings.timeout.map(|t| Instant::now() + t);
    let stop_drain = CancellationToken::new();

    let (input_tx, input_rx) = line_queue(settings.queue_capacity);
    let (output_tx, output_rx) = line_queue(settings.queue_capacity);

    let feeder = tokio::spawn(feed(id, input_rx, stdin));
    let drainer = tokio::spawn(drain(id, stdout, output_tx, stop_drain.clone()));
    let supervisor = tokio::spawn(supervise(process, deadline, stop_drain));

    tracing::debug!(group = %id, "group opened");

    Ok((
        GroupInput { id, lines: input_tx },
        GroupOutput {
            id,
            lines: output_rx,
            feeder: Some(feeder),
            drainer: Some(drainer),
            supervisor: Some(supervisor),
            timeout: settings.timeout,
        },
    ))
}

/// Wait for the worker, killing it at `deadline`.
async fn supervise(
    mut process: WorkerProcess,
    deadline: Option<Instant>,
    stop_drain: CancellationToken,
) -> WorkerStatus {
    let Some(deadline) = deadline else {
        return WorkerStatus::Exited(process.wait().await);
    };

    match tokio::time::timeout_at(deadline, process.wait()).await {
        Ok(status) => WorkerStatus::Exited(status),
        Err(_) => {
            tracing::debug!(group = %process.ordinal(), "worker deadline passed, killing");
            process.kill().await;
            // Whatever is left in the pipe still gets read, unless a
            // descendant keeps stdout open past the grace period
            tokio::spawn(async move {
                tokio::time::sleep(DRAIN_GRACE).await;
                stop_drain.cancel();
            });
            WorkerStatus::TimedOut
        }
    }
}

impl GroupInput {
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Queue one line for the worker.
    ///
    /// Returns false if the feeder has already stopped (the worker closed
    /// its stdin); the line is discarded.
    pub async fn push(&self, line: Line) -> bool {
        self.lines.send(line).await.is_ok()
    }

    /// Signal end-of-input. Does not wait for the worker.
    pub fn close(self) {
        tracing::debug!(group = %self.id, "group input closed");
    }
}

impl GroupOutput {
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Next line of worker output, `None` once the worker's stdout is done.
    pub async fn recv(&mut self) -> Option<Line> {
        self.lines.recv().await
    }

    /// Wait for the worker's exit status and join the feeder and drainer.
    ///
    /// Call after [`recv`](Self::recv) returned `None`. Failures come back as
    /// diagnostics; the output already forwarded stands.
    pub async fn reap(&mut self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        let status = match self.supervisor.take() {
            Some(handle) => handle.await,
            None => return diagnostics,
        };
        match status {
            Ok(WorkerStatus::Exited(Ok(0))) => {}
            Ok(WorkerStatus::Exited(Ok(code))) => diagnostics.push(Diagnostic::WorkerExit {
                ordinal: self.id,
                code,
            }),
            Ok(WorkerStatus::Exited(Err(e))) => diagnostics.push(Diagnostic::WorkerIo {
                ordinal: self.id,
                message: format!("wait: {e}"),
            }),
            Ok(WorkerStatus::TimedOut) => {
                // A killed worker's feeder may be stuck on a pipe nobody reads
                if let Some(feeder) = self.feeder.take() {
                    feeder.abort();
                }
                diagnostics.push(Diagnostic::WorkerTimeout {
                    ordinal: self.id,
                    timeout: self.timeout.unwrap_or_default(),
                });
            }
            Err(e) => diagnostics.push(Diagnostic::WorkerIo {
                ordinal: self.id,
                message: format!("supervisor task failed: {e}"),
            }),
        }

        let tasks = [("feeder", self.feeder.take()), ("drainer", self.drainer.take())];
        for (task, handle) in tasks {
            let Some(handle) = handle else { continue };
            match handle.await {
                Ok(Ok(lines)) => {
                    tracing::debug!(group = %self.id, lines, "{task} finished");
                }
                Ok(Err(e)) => diagnostics.push(Diagnostic::WorkerIo {
                    ordinal: self.id,
                    message: format!("{task}: {e}"),
                }),
                Err(e) => diagnostics.push(Diagnostic::WorkerIo {
                    ordinal: self.id,
                    message: format!("{task} task failed: {e}"),
                }),
            }
        }

        diagnostics
    }
}

impl Drop for GroupOutput {
    fn drop(&mut self) {
        // Aborting the supervisor drops the child, and kill_on_drop kills it
        let tasks = [
            self.feeder.take().map(|h| h.abort_handle()),
            self.drainer.take().map(|h| h.abort_handle()),
            self.supervisor.take().map(|h| h.abort_handle()),
        ];
        for handle in tasks.into_iter().flatten() {
            handle.abort();
        }
    }
}
