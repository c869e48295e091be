//! Configuration for a group-apply run.
//!
//! Settings are loaded from `~/.config/group-apply/config.toml` (or the
//! platform equivalent). The worker command itself is never part of the file;
//! it always comes from the caller.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::marker::{Markers, DEFAULT_BEGIN_MARKER, DEFAULT_END_MARKER};

/// How passthrough lines are ordered against group output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputOrdering {
    /// Passthrough lines are written as soon as they are read. Group output
    /// is ordered only against other groups, so a passthrough line that
    /// follows a group in the source can reach the sink first.
    #[default]
    Racing,
    /// Passthrough lines queue behind earlier groups; the sink sees the
    /// source's exact positional order.
    Strict,
}

impl fmt::Display for OutputOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputOrdering::Racing => write!(f, "racing"),
            OutputOrdering::Strict => write!(f, "strict"),
        }
    }
}

/// Pipeline settings shared by every group of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Prefix that opens a group.
    #[serde(default = "default_begin_marker")]
    pub begin_marker: String,

    /// Prefix that closes the active group.
    #[serde(default = "default_end_marker")]
    pub end_marker: String,

    /// Per-group deadline in milliseconds, counted from worker spawn.
    #[serde(default)]
    pub worker_timeout_ms: Option<u64>,

    /// Capacity of each group's input and output queue. `None` means
    /// unbounded; with a bound, the reader waits on a full input queue.
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    #[serde(default)]
    pub ordering: OutputOrdering,
}

fn default_begin_marker() -> String {
    DEFAULT_BEGIN_MARKER.to_string()
}

fn default_end_marker() -> String {
    DEFAULT_END_MARKER.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            begin_marker: default_begin_marker(),
            end_marker: default_end_marker(),
            worker_timeout_ms: None,
            queue_capacity: None,
            ordering: OutputOrdering::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "group-apply")
            .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        self.markers()?;
        if self.queue_capacity == Some(0) {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.worker_timeout_ms == Some(0) {
            return Err(Error::Config("worker_timeout_ms must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn markers(&self) -> Result<Markers> {
        Markers::new(&self.begin_marker, &self.end_marker)
    }

    pub fn worker_timeout(&self) -> Option<Duration> {
        self.worker_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_ordering(mut self, ordering: OutputOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout_ms = Some(timeout.as_millis().max(1) as u64);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_markers(mut self, begin: &str, end: &str) -> Self {
        self.begin_marker = begin.to_string();
        self.end_marker = end.to_string();
        self
    }
}

/// The external filter run once per group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build from an argv-style slice: program first, then arguments.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }
}

impl fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.begin_marker, "= BEGIN =");
        assert_eq!(config.end_marker, "= END =");
        assert_eq!(config.ordering, OutputOrdering::Racing);
        assert!(config.worker_timeout().is_none());
    }

    #[test]
    fn parses_all_keys() {
        let config: PipelineConfig = toml::from_str(
            r#"
            begin_marker = "<<<"
            end_marker = ">>>"
            worker_timeout_ms = 1500
            queue_capacity = 64
            ordering = "strict"
            "#,
        )
        .unwrap();
        assert_eq!(config.begin_marker, "<<<");
        assert_eq!(config.end_marker, ">>>");
        assert_eq!(config.worker_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.queue_capacity, Some(64));
        assert_eq!(config.ordering, OutputOrdering::Strict);
    }

    #[test]
    fn rejects_unknown_ordering() {
        assert!(toml::from_str::<PipelineConfig>(r#"ordering = "sideways""#).is_err());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let config = PipelineConfig::default().with_queue_capacity(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn load_from_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "queue_capacity = \"lots\"").unwrap();

        let err = PipelineConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ordering = \"strict\"\nworker_timeout_ms = 250\n").unwrap();

        let config = PipelineConfig::load_from(&path).unwrap();
        assert_eq!(config.ordering, OutputOrdering::Strict);
        assert_eq!(config.worker_timeout_ms, Some(250));
    }

    #[test]
    fn worker_command_from_argv() {
        let argv = vec!["sort".to_string(), "-r".to_string(), "-n".to_string()];
        let cmd = WorkerCommand::from_argv(&argv).unwrap();
        assert_eq!(cmd.program, "sort");
        assert_eq!(cmd.args, vec!["-r", "-n"]);
        assert_eq!(cmd.to_string(), "sort -r -n");
        assert!(WorkerCommand::from_argv(&[]).is_none());
    }
}
