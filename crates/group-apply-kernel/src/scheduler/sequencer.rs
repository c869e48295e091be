//! Output sequencer — reassembles concurrently produced group output in
//! creation order.
//!
//! The reader appends a [`BacklogEntry::Group`] the moment a group opens.
//! The sequencer takes entries strictly in append order and drains each
//! group's output queue to the end before touching the next one. A slow
//! first group simply holds the sequencer while later, faster groups buffer
//! their output in their own queues; no other coordination is needed.
//!
//! Dropping the [`BacklogSender`] tells the sequencer no more groups are
//! coming; it finishes what is queued and returns.

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::{Diagnostic, DiagnosticStream};
use crate::error::{Error, Result};

use super::group::GroupOutput;
use super::queue::Line;
use super::sink::SharedSink;

/// One unit of work for the sequencer.
#[derive(Debug)]
pub enum BacklogEntry {
    /// A group's output, registered when the group opened.
    Group(GroupOutput),
    /// A passthrough line (strict ordering only).
    Passthrough(Line),
}

#[derive(Debug, Clone)]
pub struct BacklogSender {
    sender: mpsc::UnboundedSender<BacklogEntry>,
}

#[derive(Debug)]
pub struct BacklogReceiver {
    receiver: mpsc::UnboundedReceiver<BacklogEntry>,
}

/// Create the sequencer backlog.
pub fn backlog() -> (BacklogSender, BacklogReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (BacklogSender { sender }, BacklogReceiver { receiver })
}

impl BacklogSender {
    /// Append an entry. Gives it back if the sequencer has stopped.
    pub fn push(&self, entry: BacklogEntry) -> std::result::Result<(), BacklogEntry> {
        self.sender.send(entry).map_err(|e| e.0)
    }
}

impl BacklogReceiver {
    /// Next entry in append order, `None` once the sender is dropped.
    pub async fn recv(&mut self) -> Option<BacklogEntry> {
        self.receiver.recv().await
    }
}

/// What the sequencer wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerStats {
    pub groups: usize,
    pub lines: u64,
}

pub struct OutputSequencer<W> {
    backlog: BacklogReceiver,
    sink: SharedSink<W>,
    diagnostics: DiagnosticStream,
}

impl<W: AsyncWrite + Unpin + Send> OutputSequencer<W> {
    pub fn new(
        backlog: BacklogReceiver,
        sink: SharedSink<W>,
        diagnostics: DiagnosticStream,
    ) -> Self {
        Self {
            backlog,
            sink,
            diagnostics,
        }
    }

    /// Drain the backlog until the reader drops its sender.
    ///
    /// On a fatal error the token is cancelled so the reader stops too.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SequencerStats> {
        tracing::debug!("output sequencer start");
        let result = self.drain_backlog(&cancel).await;
        if result.is_err() {
            cancel.cancel();
        }
        tracing::debug!("output sequencer end");
        result
    }

    async fn drain_backlog(&mut self, cancel: &CancellationToken) -> Result<SequencerStats> {
        let mut stats = SequencerStats::default();

        loop {
            let entry = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                entry = self.backlog.recv() => entry,
            };

            match entry {
                None => break,
                Some(BacklogEntry::Passthrough(line)) => {
                    self.sink.write_line(&line).await?;
                    stats.lines += 1;
                }
                Some(BacklogEntry::Group(group)) => {
                    stats.lines += self.flush_group(group, cancel).await?;
                    stats.groups += 1;
                }
            }
        }

        self.sink.flush().await?;
        Ok(stats)
    }

    /// Forward one group's whole output, then reap its worker.
    ///
    /// A timed-out worker has already been killed by its supervisor; its
    /// output up to that point is forwarded like any other.
    async fn flush_group(&self, mut group: GroupOutput, cancel: &CancellationToken) -> Result<u64> {
        let id = group.id();
        let mut forwarded = 0u64;

        // On error the group is dropped, which kills its worker
        let diagnostics = forward_and_reap(&self.sink, &mut group, &mut forwarded, cancel).await?;
        for diagnostic in diagnostics {
            self.diagnostics.emit(diagnostic);
        }

        self.sink.flush().await?;
        tracing::debug!(group = %id, forwarded, "group flushed");
        Ok(forwarded)
    }
}

async fn forward_and_reap<W: AsyncWrite + Unpin>(
    sink: &SharedSink<W>,
    group: &mut GroupOutput,
    forwarded: &mut u64,
    cancel: &CancellationToken,
) -> Result<Vec<Diagnostic>> {
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            line = group.recv() => line,
        };
        let Some(line) = line else { break };
        sink.write_line(&line).await?;
        *forwarded += 1;
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        diagnostics = group.reap() => Ok(diagnostics),
    }
}
