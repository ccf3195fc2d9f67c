//! Output capture pipeline
//!
//! Drains a child's stdout and stderr as one merged line stream into the
//! instance console. It runs from spawn until both pipes reach EOF whether or
//! not anyone is watching the console: an undrained pipe fills its kernel
//! buffer and stalls the child.

use std::io;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

use crate::buffer::ConsoleLog;
use crate::id::InstanceId;

/// Pump both output pipes into `console` until they close
pub(crate) async fn run<O, E>(
    id: InstanceId,
    console: ConsoleLog,
    stdout: Option<O>,
    stderr: Option<E>,
) where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let mut merged = stream::select(line_stream(stdout), line_stream(stderr));
    let mut captured = 0u64;

    while let Some(line) = merged.next().await {
        match line {
            Ok(line) => {
                console.append(&line);
                captured += 1;
            }
            Err(e) => {
                // One broken pipe ends that pipe only; the other keeps draining.
                warn!(instance = %id, error = %e, "Console reader failed");
                console.append(&format!("[console reader error] {e}"));
            }
        }
    }

    debug!(instance = %id, lines = captured, "Output capture finished");
}

/// Lines of `reader`, decoded lossily, without their terminators
///
/// The stream ends at EOF, or right after yielding a read error.
fn line_stream<R>(reader: Option<R>) -> BoxStream<'static, io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(reader) = reader else {
        return stream::empty().boxed();
    };

    stream::unfold(Some(BufReader::new(reader)), |state| async move {
        let mut reader = state?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                Some((Ok(line), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}
