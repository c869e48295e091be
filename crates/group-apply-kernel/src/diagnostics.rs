//! Non-fatal run diagnostics.
//!
//! The reader and the output sequencer both report problems while they run.
//! They share a [`DiagnosticStream`]: a cloneable, Send+Sync handle backed by
//! an unbounded mpsc channel. Every diagnostic is logged at `warn` the moment
//! it is emitted, and the pipeline drains the receiver into its
//! [`RunReport`](crate::pipeline::RunReport) when the run ends.
//!
//! ```text
//!   LineSourceReader ──┐
//!                      ├──▶ DiagnosticStream (mpsc) ──▶ drain ──▶ RunReport
//!   OutputSequencer ───┘
//! ```

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::scheduler::GroupId;

/// Something went wrong, but the run carried on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A begin marker arrived while `ordinal` was still open. The open group
    /// was closed with whatever it had received.
    MissingEnd { ordinal: GroupId, line: u64 },

    /// An end marker arrived with no open group. The line was dropped.
    UnexpectedEnd { line: u64 },

    /// The source ended while `ordinal` was open. The group was closed.
    UnterminatedGroup { ordinal: GroupId },

    /// The worker exited with a non-zero status. `code` is `128 + signal`
    /// for workers killed by a signal.
    WorkerExit { ordinal: GroupId, code: i32 },

    /// The worker did not finish before its deadline and was killed.
    WorkerTimeout { ordinal: GroupId, timeout: Duration },

    /// Feeding or draining the worker's pipes failed.
    WorkerIo { ordinal: GroupId, message: String },
}

impl Diagnostic {
    /// Group the diagnostic is about, if any.
    pub fn ordinal(&self) -> Option<GroupId> {
        match self {
            Diagnostic::MissingEnd { ordinal, .. }
            | Diagnostic::UnterminatedGroup { ordinal }
            | Diagnostic::WorkerExit { ordinal, .. }
            | Diagnostic::WorkerTimeout { ordinal, .. }
            | Diagnostic::WorkerIo { ordinal, .. } => Some(*ordinal),
            Diagnostic::UnexpectedEnd { .. } => None,
        }
    }

    /// Marker protocol problem, as opposed to a worker failure.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Diagnostic::MissingEnd { .. }
                | Diagnostic::UnexpectedEnd { .. }
                | Diagnostic::UnterminatedGroup { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingEnd { ordinal, line } => write!(
                f,
                "missing end of a group (group {ordinal} closed by begin marker at line {line})"
            ),
            Diagnostic::UnexpectedEnd { line } => {
                write!(f, "unexpected end of a group at line {line}")
            }
            Diagnostic::UnterminatedGroup { ordinal } => write!(
                f,
                "missing end of a group (group {ordinal} closed at end of input)"
            ),
            Diagnostic::WorkerExit { ordinal, code } => {
                write!(f, "group {ordinal}: worker exited with status {code}")
            }
            Diagnostic::WorkerTimeout { ordinal, timeout } => write!(
                f,
                "group {ordinal}: worker timed out after {}ms and was killed",
                timeout.as_millis()
            ),
            Diagnostic::WorkerIo { ordinal, message } => {
                write!(f, "group {ordinal}: worker i/o error: {message}")
            }
        }
    }
}

/// Cloneable handle for reporting diagnostics.
#[derive(Clone, Debug)]
pub struct DiagnosticStream {
    sender: mpsc::UnboundedSender<Diagnostic>,
}

/// Receiving end of the diagnostic stream. Owned by the pipeline.
#[derive(Debug)]
pub struct DiagnosticReceiver {
    receiver: mpsc::UnboundedReceiver<Diagnostic>,
}

/// Create a new diagnostic stream pair.
pub fn diagnostic_stream() -> (DiagnosticStream, DiagnosticReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        DiagnosticStream { sender },
        DiagnosticReceiver { receiver },
    )
}

impl DiagnosticStream {
    /// Log the diagnostic and queue it for the report.
    ///
    /// Never blocks. If the receiver is gone the diagnostic is still logged.
    pub fn emit(&self, diagnostic: Diagnostic) {
        tracing::warn!("{diagnostic}");
        let _ = self.sender.send(diagnostic);
    }
}

impl DiagnosticReceiver {
    /// Collect everything emitted so far, in emission order.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        while let Ok(diagnostic) = self.receiver.try_recv() {
            out.push(diagnostic);
        }
        out
    }

    /// Wait for the next diagnostic. `None` once every stream handle is dropped.
    pub async fn recv(&mut self) -> Option<Diagnostic> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_emission_order() {
        let (stream, mut rx) = diagnostic_stream();
        stream.emit(Diagnostic::UnexpectedEnd { line: 4 });
        stream.clone().emit(Diagnostic::UnterminatedGroup { ordinal: GroupId(2) });

        assert_eq!(
            rx.drain(),
            vec![
                Diagnostic::UnexpectedEnd { line: 4 },
                Diagnostic::UnterminatedGroup { ordinal: GroupId(2) },
            ]
        );
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn emit_after_receiver_dropped_is_silent() {
        let (stream, rx) = diagnostic_stream();
        drop(rx);
        stream.emit(Diagnostic::UnexpectedEnd { line: 1 });
    }

    #[tokio::test]
    async fn recv_ends_when_streams_dropped() {
        let (stream, mut rx) = diagnostic_stream();
        stream.emit(Diagnostic::WorkerExit { ordinal: GroupId(1), code: 2 });
        drop(stream);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn protocol_messages_keep_original_wording() {
        let missing = Diagnostic::MissingEnd { ordinal: GroupId(1), line: 7 };
        let unexpected = Diagnostic::UnexpectedEnd { line: 3 };
        assert!(missing.to_string().starts_with("missing end of a group"));
        assert!(unexpected.to_string().starts_with("unexpected end of a group"));
        assert!(missing.is_protocol_violation());
        assert_eq!(unexpected.ordinal(), None);
    }

    #[test]
    fn worker_diagnostics_name_the_group() {
        let exit = Diagnostic::WorkerExit { ordinal: GroupId(5), code: 3 };
        assert_eq!(exit.to_string(), "group 5: worker exited with status 3");
        assert!(!exit.is_protocol_violation());

        let timeout = Diagnostic::WorkerTimeout {
            ordinal: GroupId(2),
            timeout: Duration::from_millis(250),
        };
        assert!(timeout.to_string().contains("250ms"));
    }
}
