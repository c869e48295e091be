//! Scheduler for group-apply — per-group workers and ordered output.
//!
//! This module provides:
//! - **Worker pipes**: one external process per group, stdin and stdout piped.
//! - **Feeder / Drainer**: two tasks per group moving lines into and out of
//!   the worker.
//! - **Output sequencer**: drains group outputs in the order groups were
//!   opened, no matter which worker finishes first.
//!
//! # Architecture
//!
//! ```text
//!                       ┌──────────── Group n ────────────┐
//!  LineSourceReader ──▶ │ input queue ─▶ Feeder ─▶ stdin  │
//!        │              │                          worker │
//!        │              │ output queue ◀─ Drainer ◀ stdout│
//!        │              └───────┬─────────────────────────┘
//!        │  register at BEGIN   │
//!        └──────────▶ backlog ──┴──▶ OutputSequencer ──▶ sink
//!        │                                                ▲
//!        └──────── passthrough (racing mode) ─────────────┘
//! ```
//!
//! Every queue has exactly one producer and one consumer. Closing a queue's
//! sending half is the end-of-stream signal.

mod drainer;
mod feeder;
mod group;
mod queue;
mod sequencer;
mod sink;
mod worker;

pub use drainer::drain;
pub use feeder::feed;
pub use group::{open_group, GroupId, GroupInput, GroupOutput, GroupSettings};
pub use queue::{line_queue, Line, LineReceiver, LineSender};
pub use sequencer::{
    backlog, BacklogEntry, BacklogReceiver, BacklogSender, OutputSequencer, SequencerStats,
};
pub use sink::SharedSink;
pub use worker::{WorkerPipe, WorkerProcess};
