//! The final output sink, shared by the reader and the sequencer.
//!
//! In racing mode the reader writes passthrough lines while the sequencer
//! writes group output, so the writer sits behind a tokio mutex. Each line is
//! written under one lock acquisition and never splits.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

pub struct SharedSink<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for SharedSink<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<W> std::fmt::Debug for SharedSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSink").finish()
    }
}

impl<W: AsyncWrite + Unpin> SharedSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub async fn write_line(&self, line: &[u8]) -> Result<()> {
        let mut writer = self.inner.lock().await;
        writer
            .write_all(line)
            .await
            .map_err(|e| Error::io("failed to write output", e))
    }

    pub async fn flush(&self) -> Result<()> {
        let mut writer = self.inner.lock().await;
        writer
            .flush()
            .await
            .map_err(|e| Error::io("failed to flush output", e))
    }
}
