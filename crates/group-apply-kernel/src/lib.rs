//! group-apply-kernel: ordered parallel filtering of marked line groups.
//!
//! A source stream contains regions delimited by `= BEGIN =` and `= END =`
//! lines. Each region is piped through its own freshly spawned worker
//! process; all workers run concurrently, and their output is put back into
//! the stream at the position the region occupied.
//!
//! This crate provides:
//!
//! - **Markers**: line classification by literal prefix
//! - **Config**: TOML-backed pipeline settings and the worker command
//! - **Scheduler**: worker pipes, per-group feeder and drainer tasks, and the
//!   output sequencer that restores creation order
//! - **Reader**: the line source reader that opens and closes groups
//! - **Pipeline**: [`GroupPipeline`], which runs all of the above to completion
//! - **Diagnostics**: non-fatal problems, collected into a [`RunReport`]
//!
//! ```no_run
//! use group_apply_kernel::{GroupPipeline, PipelineConfig, WorkerCommand};
//!
//! # async fn demo() -> group_apply_kernel::Result<()> {
//! let pipeline = GroupPipeline::new(PipelineConfig::default(), WorkerCommand::new("sort"))?;
//! let report = pipeline
//!     .run_path("input.log".as_ref(), tokio::io::stdout())
//!     .await?;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod marker;
pub mod pipeline;
pub mod reader;
pub mod scheduler;

pub use config::{OutputOrdering, PipelineConfig, WorkerCommand};
pub use diagnostics::{Diagnostic, DiagnosticReceiver, DiagnosticStream};
pub use error::{Error, Result};
pub use marker::{LineKind, Markers, DEFAULT_BEGIN_MARKER, DEFAULT_END_MARKER};
pub use pipeline::{GroupPipeline, RunReport};
pub use scheduler::GroupId;

// Re-exported so embedders can cancel runs without depending on tokio-util
pub use tokio_util::sync::CancellationToken;
