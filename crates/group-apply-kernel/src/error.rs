//! Fatal errors for a group-apply run.
//!
//! Protocol violations and worker failures are not errors; they are
//! [`Diagnostic`](crate::diagnostics::Diagnostic)s and the run continues.
//! Anything here aborts the run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::scheduler::GroupId;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop a run.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading the source or writing the sink failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A worker process could not be started.
    #[error("group {ordinal}: failed to spawn {program}: {source}")]
    Spawn {
        ordinal: GroupId,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config from {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config from {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The run's cancellation token fired.
    #[error("run cancelled")]
    Cancelled,

    #[error("pipeline task panicked: {0}")]
    TaskPanicked(String),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// True for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_names_group_and_program() {
        let err = Error::Spawn {
            ordinal: GroupId(3),
            program: "nope".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("group 3: failed to spawn nope"), "{msg}");
    }

    #[test]
    fn io_error_keeps_context() {
        let err = Error::io("failed to read source", io::Error::other("boom"));
        assert_eq!(err.to_string(), "failed to read source: boom");
        assert!(!err.is_cancelled());
        assert!(Error::Cancelled.is_cancelled());
    }
}
