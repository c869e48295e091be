//! Line queues between the reader, the per-group tasks and the sequencer.
//!
//! A queue is unbounded unless a capacity is configured. Dropping the
//! [`LineSender`] ends the queue: the receiver yields the remaining lines,
//! then `None`. There is no in-band sentinel, so an empty line is just data.

use tokio::sync::mpsc;

/// One raw line, terminator included (the last line of a stream may have none).
pub type Line = Vec<u8>;

/// Producing half of a line queue.
#[derive(Debug)]
pub enum LineSender {
    Unbounded(mpsc::UnboundedSender<Line>),
    Bounded(mpsc::Sender<Line>),
}

/// Consuming half of a line queue.
#[derive(Debug)]
pub enum LineReceiver {
    Unbounded(mpsc::UnboundedReceiver<Line>),
    Bounded(mpsc::Receiver<Line>),
}

/// Create a line queue. `None` is unbounded; a bound of 0 is raised to 1.
pub fn line_queue(capacity: Option<usize>) -> (LineSender, LineReceiver) {
    match capacity {
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (LineSender::Unbounded(tx), LineReceiver::Unbounded(rx))
        }
        Some(cap) => {
            let (tx, rx) = mpsc::channel(cap.max(1));
            (LineSender::Bounded(tx), LineReceiver::Bounded(rx))
        }
    }
}

impl LineSender {
    /// Enqueue a line, waiting for room on a bounded queue.
    ///
    /// Gives the line back if the consumer is gone.
    pub async fn send(&self, line: Line) -> Result<(), Line> {
        match self {
            LineSender::Unbounded(tx) => tx.send(line).map_err(|e| e.0),
            LineSender::Bounded(tx) => tx.send(line).await.map_err(|e| e.0),
        }
    }
}

impl LineReceiver {
    /// Next line in FIFO order, or `None` after the sender is dropped and
    /// everything queued has been taken.
    pub async fn recv(&mut self) -> Option<Line> {
        match self {
            LineReceiver::Unbounded(rx) => rx.recv().await,
            LineReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_then_end_after_sender_drop() {
        let (tx, mut rx) = line_queue(None);
        tx.send(b"one\n".to_vec()).await.unwrap();
        tx.send(b"\n".to_vec()).await.unwrap();
        tx.send(b"three".to_vec()).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await.unwrap(), b"one\n");
        // An empty line is data, not an end marker
        assert_eq!(rx.recv().await.unwrap(), b"\n");
        assert_eq!(rx.recv().await.unwrap(), b"three");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_fails_after_receiver_drop() {
        let (tx, rx) = line_queue(None);
        drop(rx);
        assert_eq!(tx.send(b"lost\n".to_vec()).await.unwrap_err(), b"lost\n");
    }

    #[tokio::test]
    async fn bounded_queue_applies_backpressure() {
        let (tx, mut rx) = line_queue(Some(1));
        tx.send(b"a\n".to_vec()).await.unwrap();

        // Second send must wait until the consumer makes room
        let second = tx.send(b"b\n".to_vec());
        let blocked = tokio::time::timeout(Duration::from_millis(50), second).await;
        assert!(blocked.is_err(), "send on a full bounded queue should wait");

        assert_eq!(rx.recv().await.unwrap(), b"a\n");
        tx.send(b"b\n".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"b\n");
    }

    #[tokio::test]
    async fn zero_capacity_is_raised_to_one() {
        let (tx, mut rx) = line_queue(Some(0));
        tx.send(b"x\n".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"x\n");
    }
}
