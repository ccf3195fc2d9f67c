//! Console streaming sessions
//!
//! Each subscriber gets its own publisher task that first replays the
//! buffered console, then tails new lines on a fixed poll interval until the
//! instance stops and the backlog is drained, and finally emits a sentinel.
//! Sessions only read the console through their own cursor, so any number of
//! them see the same ordered lines without coordinating.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::debug;

use crate::buffer::ConsoleLog;
use crate::id::InstanceId;
use crate::instance::InstanceState;

/// Line content of the final event of every session
pub const STREAM_END_SENTINEL: &str = "[console stream ended]";

/// Events buffered between a publisher and a slow subscriber
const SESSION_CHANNEL_CAPACITY: usize = 256;

/// One console line delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEvent {
    pub line: String,
}

impl ConsoleEvent {
    pub fn line(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }

    /// The closing sentinel
    pub fn end() -> Self {
        Self::line(STREAM_END_SENTINEL)
    }

    pub fn is_end(&self) -> bool {
        self.line == STREAM_END_SENTINEL
    }

    /// Wire frame: `data: {"line": ...}` followed by a blank line
    pub fn to_frame(&self) -> String {
        let json = serde_json::to_string(self)
            .unwrap_or_else(|_| format!("{{\"line\":{:?}}}", self.line));
        format!("data: {json}\n\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Replaying,
    Tailing,
    Terminal,
}

/// The publisher side of one session
struct Publisher {
    id: InstanceId,
    console: ConsoleLog,
    state: watch::Receiver<InstanceState>,
    poll_interval: Duration,
    tx: mpsc::Sender<ConsoleEvent>,
    cursor: u64,
    phase: Phase,
}

impl Publisher {
    async fn run(mut self) {
        debug!(instance = %self.id, "Console session attached");
        loop {
            match self.phase {
                Phase::Replaying => {
                    let (lines, cursor) = self.console.replay();
                    if !self.emit_all(lines).await {
                        break;
                    }
                    self.cursor = cursor;
                    self.phase = Phase::Tailing;
                }
                Phase::Tailing => {
                    // Liveness first: the monitor appends its exit line before
                    // flipping the state, so a dead instance's backlog read
                    // below is complete.
                    let alive = self.state.borrow().is_alive();
                    let chunk = self.console.read_since(self.cursor);
                    if chunk.skipped > 0 {
                        debug!(instance = %self.id, skipped = chunk.skipped, "Console session fell behind");
                    }
                    if !self.emit_all(chunk.lines).await {
                        break;
                    }
                    self.cursor = chunk.next;

                    if !alive {
                        self.phase = Phase::Terminal;
                        continue;
                    }
                    tokio::select! {
                        _ = self.tx.closed() => break,
                        _ = sleep(self.poll_interval) => {}
                    }
                }
                Phase::Terminal => {
                    let _ = self.tx.send(ConsoleEvent::end()).await;
                    break;
                }
            }
        }
        debug!(instance = %self.id, phase = ?self.phase, "Console session ended");
    }

    /// Send lines in order; false once the subscriber is gone
    async fn emit_all(&self, lines: Vec<String>) -> bool {
        for line in lines {
            if self.tx.send(ConsoleEvent::line(line)).await.is_err() {
                return false;
            }
        }
        true
    }
}

/// Subscriber side of one console session
///
/// Yields [`ConsoleEvent`]s and ends after the sentinel. Dropping it
/// disconnects: the publisher notices right away, not on its next poll.
#[derive(Debug)]
pub struct ConsoleStream {
    rx: mpsc::Receiver<ConsoleEvent>,
}

impl ConsoleStream {
    /// Start a publisher for `console`, alive while `state` says so
    pub fn attach(
        id: InstanceId,
        console: ConsoleLog,
        state: watch::Receiver<InstanceState>,
        poll_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let publisher = Publisher {
            id,
            console,
            state,
            poll_interval,
            tx,
            cursor: 0,
            phase: Phase::Replaying,
        };
        tokio::spawn(publisher.run());
        Self { rx }
    }

    /// Next event, or `None` after the sentinel
    pub async fn next_event(&mut self) -> Option<ConsoleEvent> {
        self.rx.recv().await
    }
}

impl Stream for ConsoleStream {
    type Item = ConsoleEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
