//! Group drainer: worker stdout → output queue.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

use super::group::GroupId;
use super::queue::LineSender;

/// Read `stdout` line by line into `output` until end-of-stream or `stop`.
///
/// Returns the number of lines queued. The output queue closes when this
/// returns and `output` is dropped. A final line without a terminator is
/// forwarded as-is. `stop` ends draining of a killed worker whose stdout is
/// still held open by a descendant.
pub async fn drain<R>(
    ordinal: GroupId,
    stdout: R,
    output: LineSender,
    stop: CancellationToken,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    tracing::debug!(group = %ordinal, "drainer start");
    let mut reader = BufReader::new(stdout);
    let mut queued = 0u64;

    loop {
        let mut line = Vec::new();
        let read = tokio::select! {
            biased;
            read = reader.read_until(b'\n', &mut line) => read?,
            _ = stop.cancelled() => {
                tracing::debug!(group = %ordinal, "drainer stopped");
                break;
            }
        };
        if read == 0 {
            break;
        }
        if output.send(line).await.is_err() {
            // Sequencer abandoned this group
            tracing::debug!(group = %ordinal, "output queue closed, stop draining");
            break;
        }
        queued += 1;
    }

    tracing::debug!(group = %ordinal, queued, "drainer end");
    Ok(queued)
}
