//! Group feeder: input queue → worker stdin.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::group::GroupId;
use super::queue::LineReceiver;

/// Write every queued line to `stdin` in order, then close it.
///
/// Returns the number of lines written. A worker that stops reading early
/// (broken pipe) is not an error: the rest of the group's input is dropped
/// and the feeder ends normally.
pub async fn feed<W>(ordinal: GroupId, mut input: LineReceiver, mut stdin: W) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    tracing::debug!(group = %ordinal, "feeder start");
    let mut written = 0u64;

    while let Some(line) = input.recv().await {
        match stdin.write_all(&line).await {
            Ok(()) => written += 1,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(group = %ordinal, written, "worker closed stdin early");
                return Ok(written);
            }
            Err(e) => return Err(e),
        }
    }

    // Queue closed: signal end-of-input to the worker
    match stdin.shutdown().await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Err(e) => return Err(e),
    }
    drop(stdin);

    tracing::debug!(group = %ordinal, written, "feeder end");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::queue::line_queue;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn writes_in_order_then_closes() {
        let (tx, rx) = line_queue(None);
        let (writer, mut reader) = tokio::io::duplex(1024);

        for line in ["c\n", "a\n", "b\n"] {
            tx.send(line.as_bytes().to_vec()).await.unwrap();
        }
        drop(tx);

        let written = feed(GroupId(1), rx, writer).await.unwrap();
        assert_eq!(written, 3);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"c\na\nb\n");
    }

    #[tokio::test]
    async fn waits_for_queue_close_before_closing_stdin() {
        let (tx, rx) = line_queue(None);
        let (writer, mut reader) = tokio::io::duplex(1024);
        let task = tokio::spawn(feed(GroupId(1), rx, writer));

        tx.send(b"early\n".to_vec()).await.unwrap();
        let mut buf = [0u8; 6];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"early\n");
        assert!(!task.is_finished());

        tx.send(b"late\n".to_vec()).await.unwrap();
        drop(tx);

        assert_eq!(task.await.unwrap().unwrap(), 2);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"late\n");
    }

    #[tokio::test]
    async fn broken_pipe_ends_quietly() {
        let (tx, rx) = line_queue(None);
        let (writer, reader) = tokio::io::duplex(16);
        drop(reader);

        tx.send(b"nobody reads this\n".to_vec()).await.unwrap();
        drop(tx);

        assert_eq!(feed(GroupId(1), rx, writer).await.unwrap(), 0);
    }
}
