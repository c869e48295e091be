//! Line source reader.
//!
//! Scans the source line by line. Begin markers open a group (spawning its
//! worker and registering its output with the sequencer), end markers close
//! it, data lines go to the active group or straight to the sink.
//!
//! The reader owns the session state; no other task sees which group is active.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::config::{OutputOrdering, WorkerCommand};
use crate::diagnostics::{Diagnostic, DiagnosticStream};
use crate::error::{Error, Result};
use crate::marker::{LineKind, Markers};
use crate::scheduler::{
    open_group, BacklogEntry, BacklogSender, GroupId, GroupInput, GroupSettings, Line, SharedSink,
};

/// Reader-private state: at most one active group.
#[derive(Debug, Default)]
struct Session {
    active: Option<GroupInput>,
    opened: usize,
    line_no: u64,
}

/// What the reader saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub groups: usize,
    pub passthrough_lines: u64,
}

pub struct LineSourceReader<R, W> {
    source: R,
    markers: Markers,
    command: Arc<WorkerCommand>,
    settings: GroupSettings,
    ordering: OutputOrdering,
    backlog: BacklogSender,
    sink: SharedSink<W>,
    diagnostics: DiagnosticStream,
    session: Session,
    stats: ReaderStats,
}

impl<R, W> LineSourceReader<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: R,
        markers: Markers,
        command: Arc<WorkerCommand>,
        settings: GroupSettings,
        ordering: OutputOrdering,
        backlog: BacklogSender,
        sink: SharedSink<W>,
        diagnostics: DiagnosticStream,
    ) -> Self {
        Self {
            source,
            markers,
            command,
            settings,
            ordering,
            backlog,
            sink,
            diagnostics,
            session: Session::default(),
            stats: ReaderStats::default(),
        }
    }

    /// Read the source to exhaustion.
    ///
    /// Every group opened gets its end-of-input signal before this returns,
    /// and the backlog sender is dropped on return, which tells the
    /// sequencer no more groups are coming.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<ReaderStats> {
        tracing::debug!("reader start");

        loop {
            let mut line = Line::new();
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                read = self.source.read_until(b'\n', &mut line) => read,
            };
            if read.map_err(|e| Error::io("failed to read source", e))? == 0 {
                break;
            }
            self.session.line_no += 1;

            match self.markers.classify(&line) {
                LineKind::Begin => {
                    if !self.begin_group()? {
                        break;
                    }
                }
                LineKind::End => self.end_group(),
                LineKind::Data => {
                    if !self.route(line).await? {
                        break;
                    }
                }
            }
        }

        if let Some(group) = self.session.active.take() {
            self.diagnostics.emit(Diagnostic::UnterminatedGroup { ordinal: group.id() });
            group.close();
        }

        tracing::debug!(
            groups = self.stats.groups,
            passthrough = self.stats.passthrough_lines,
            "reader end"
        );
        Ok(self.stats)
    }

    /// Force-close any active group, then open a new one.
    ///
    /// Returns false if the sequencer is gone and reading should stop.
    fn begin_group(&mut self) -> Result<bool> {
        if let Some(group) = self.session.active.take() {
            self.diagnostics.emit(Diagnostic::MissingEnd {
                ordinal: group.id(),
                line: self.session.line_no,
            });
            group.close();
        }

        let id = GroupId(self.session.opened + 1);
        let (input, output) = open_group(id, &self.command, &self.settings)?;
        self.session.opened += 1;
        self.stats.groups += 1;

        if self.backlog.push(BacklogEntry::Group(output)).is_err() {
            tracing::debug!(group = %id, "sequencer stopped, abandoning input");
            return Ok(false);
        }
        self.session.active = Some(input);
        Ok(true)
    }

    fn end_group(&mut self) {
        match self.session.active.take() {
            Some(group) => group.close(),
            None => self.diagnostics.emit(Diagnostic::UnexpectedEnd {
                line: self.session.line_no,
            }),
        }
    }

    /// Send a data line to the active group, or pass it through.
    async fn route(&mut self, line: Line) -> Result<bool> {
        if let Some(group) = &self.session.active {
            if !group.push(line).await {
                tracing::trace!(group = %group.id(), "worker stopped reading, line dropped");
            }
            return Ok(true);
        }

        self.stats.passthrough_lines += 1;
        match self.ordering {
            OutputOrdering::Racing => {
                self.sink.write_line(&line).await?;
                Ok(true)
            }
            OutputOrdering::Strict => {
                Ok(self.backlog.push(BacklogEntry::Passthrough(line)).is_ok())
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::diagnostics::diagnostic_stream;
    use crate::scheduler::backlog;

    fn reader_over(
        input: &'static [u8],
        ordering: OutputOrdering,
    ) -> (
        LineSourceReader<std::io::Cursor<&'static [u8]>, tokio::io::DuplexStream>,
        crate::scheduler::BacklogReceiver,
        crate::diagnostics::DiagnosticReceiver,
        tokio::io::DuplexStream,
    ) {
        let (writer, reader) = tokio::io::duplex(4096);
        let (diagnostics, diag_rx) = diagnostic_stream();
        let (tx, rx) = backlog();
        let source = LineSourceReader::new(
            std::io::Cursor::new(input),
            Markers::default(),
            Arc::new(WorkerCommand::new("cat")),
            GroupSettings::default(),
            ordering,
            tx,
            SharedSink::new(writer),
            diagnostics,
        );
        (source, rx, diag_rx, reader)
    }

    #[tokio::test]
    async fn counts_groups_and_passthrough() {
        let (reader, _backlog, mut diags, _out) = reader_over(
            b"a\n= BEGIN =\nx\n= END =\nb\n= BEGIN =\ny\n= END =\n",
            OutputOrdering::Racing,
        );
        let stats = reader.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats, ReaderStats { groups: 2, passthrough_lines: 2 });
        assert!(diags.drain().is_empty());
    }

    #[tokio::test]
    async fn lone_end_is_reported_with_line_number() {
        let (reader, _backlog, mut diags, _out) =
            reader_over(b"a\nb\n= END =\nc\n", OutputOrdering::Racing);
        let stats = reader.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.groups, 0);
        assert_eq!(stats.passthrough_lines, 3);
        assert_eq!(diags.drain(), vec![Diagnostic::UnexpectedEnd { line: 3 }]);
    }

    #[tokio::test]
    async fn strict_mode_queues_passthrough_in_backlog() {
        let (reader, mut backlog, _diags, _out) =
            reader_over(b"a\n= BEGIN =\nx\n= END =\nb\n", OutputOrdering::Strict);
        reader.run(CancellationToken::new()).await.unwrap();

        let mut kinds = Vec::new();
        while let Some(entry) = backlog.recv().await {
            kinds.push(match entry {
                BacklogEntry::Passthrough(line) => String::from_utf8(line).unwrap(),
                BacklogEntry::Group(group) => format!("group {}", group.id()),
            });
        }
        assert_eq!(kinds, vec!["a\n", "group 1", "b\n"]);
    }

    #[tokio::test]
    async fn double_begin_force_closes_once() {
        let (reader, _backlog, mut diags, _out) =
            reader_over(b"= BEGIN =\n1\n= BEGIN =\n2\n= END =\n", OutputOrdering::Racing);
        let stats = reader.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.groups, 2);
        assert_eq!(
            diags.drain(),
            vec![Diagnostic::MissingEnd { ordinal: GroupId(1), line: 3 }]
        );
    }
}
