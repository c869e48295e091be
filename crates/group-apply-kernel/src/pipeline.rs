//! Pipeline runner.
//!
//! Wires one [`LineSourceReader`] and one [`OutputSequencer`] together over a
//! shared sink, runs them as two tasks, and turns their outcome into a
//! [`RunReport`] or a fatal [`Error`].

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{PipelineConfig, WorkerCommand};
use crate::diagnostics::{diagnostic_stream, Diagnostic};
use crate::error::{Error, Result};
use crate::marker::Markers;
use crate::reader::{LineSourceReader, ReaderStats};
use crate::scheduler::{
    backlog, GroupId, GroupSettings, OutputSequencer, SequencerStats, SharedSink,
};

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Groups opened.
    pub groups: usize,
    /// Lines outside any group.
    pub passthrough_lines: u64,
    /// Everything non-fatal that went wrong, in the order it was reported.
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    /// No protocol violations and no worker failures.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Number of marker protocol violations.
    pub fn protocol_violations(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.is_protocol_violation())
            .count()
    }

    /// Groups whose worker failed, timed out or hit an I/O error.
    pub fn failed_groups(&self) -> BTreeSet<GroupId> {
        self.diagnostics
            .iter()
            .filter(|d| !d.is_protocol_violation())
            .filter_map(Diagnostic::ordinal)
            .collect()
    }
}

/// Runs marked groups of a source through a worker command.
#[derive(Debug, Clone)]
pub struct GroupPipeline {
    config: PipelineConfig,
    markers: Markers,
    command: Arc<WorkerCommand>,
    cancel: CancellationToken,
}

impl GroupPipeline {
    /// Create a pipeline. Fails if the configuration is invalid.
    pub fn new(config: PipelineConfig, command: WorkerCommand) -> Result<Self> {
        config.validate()?;
        let markers = config.markers()?;
        Ok(Self {
            config,
            markers,
            command: Arc::new(command),
            cancel: CancellationToken::new(),
        })
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels every run of this pipeline.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }

    /// Process the file at `path`, writing to `sink`.
    pub async fn run_path<W>(&self, path: &Path, sink: W) -> Result<RunReport>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::io(format!("failed to open {}", path.display()), e))?;
        self.run(BufReader::new(file), sink).await
    }

    /// Process `source` to exhaustion, writing to `sink`.
    ///
    /// Returns once every group's output has been written and every worker
    /// has exited. The sink is flushed and dropped before this returns.
    pub async fn run<R, W>(&self, source: R, sink: W) -> Result<RunReport>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let run_cancel = self.cancel.child_token();
        let (diagnostics, mut diagnostic_rx) = diagnostic_stream();
        let (backlog_tx, backlog_rx) = backlog();
        let sink = SharedSink::new(sink);

        tracing::debug!(command = %self.command, ordering = %self.config.ordering, "run start");

        let sequencer = OutputSequencer::new(backlog_rx, sink.clone(), diagnostics.clone());
        let sequencer_task = tokio::spawn(sequencer.run(run_cancel.clone()));

        let reader = LineSourceReader::new(
            source,
            self.markers.clone(),
            self.command.clone(),
            GroupSettings::from(&self.config),
            self.config.ordering,
            backlog_tx,
            sink,
            diagnostics,
        );
        let reader_task = tokio::spawn(reader.run(run_cancel.clone()));

        let reader_result = join(reader_task).await;
        if reader_result.is_err() {
            // Abandon registered groups; their workers are killed on drop
            run_cancel.cancel();
        }
        let sequencer_result = join(sequencer_task).await;

        let (reader_stats, _sequencer_stats) = settle(reader_result, sequencer_result)?;

        let report = RunReport {
            groups: reader_stats.groups,
            passthrough_lines: reader_stats.passthrough_lines,
            diagnostics: diagnostic_rx.drain(),
        };
        tracing::debug!(
            groups = report.groups,
            diagnostics = report.diagnostics.len(),
            "run end"
        );
        Ok(report)
    }
}

async fn join<T>(task: JoinHandle<Result<T>>) -> Result<T> {
    match task.await {
        Ok(result) => result,
        Err(e) => Err(Error::TaskPanicked(e.to_string())),
    }
}

/// Pick the error that explains the failure. A cancellation caused by the
/// other task's failure is not interesting.
fn settle(
    reader: Result<ReaderStats>,
    sequencer: Result<SequencerStats>,
) -> Result<(ReaderStats, SequencerStats)> {
    match (reader, sequencer) {
        (Ok(r), Ok(s)) => Ok((r, s)),
        (Err(e), _) if !e.is_cancelled() => Err(e),
        (_, Err(e)) if !e.is_cancelled() => Err(e),
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}
