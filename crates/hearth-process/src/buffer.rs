//! Bounded console log
//!
//! [`ConsoleBuffer`] is the plain data structure: a FIFO of lines with a
//! fixed capacity. Every line also receives a sequence number (its position
//! in the stream of all lines ever appended), so readers can keep an
//! absolute cursor that stays valid while old lines are evicted.
//!
//! [`ConsoleLog`] wraps a buffer in its own lock and is what the capture
//! pipeline, the process monitor and stream publishers share.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Default number of lines retained per instance
pub const DEFAULT_CONSOLE_CAPACITY: usize = 1000;

/// Fixed-capacity FIFO of console lines
#[derive(Debug, Clone)]
pub struct ConsoleBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    /// Sequence number the next appended line will get
    next_seq: u64,
}

/// Lines read from a cursor onward
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleChunk {
    /// Lines at or after the cursor, oldest first
    pub lines: Vec<String>,
    /// Cursor to pass on the next read
    pub next: u64,
    /// Lines evicted before the reader got to them
    pub skipped: u64,
}

impl ConsoleBuffer {
    /// Create an empty buffer; a capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(DEFAULT_CONSOLE_CAPACITY)),
            capacity,
            next_seq: 0,
        }
    }

    /// Append text, splitting embedded line breaks into separate lines
    ///
    /// Returns the number of lines pushed. Text without any line content
    /// (the empty string) pushes nothing.
    pub fn append(&mut self, text: &str) -> usize {
        let mut pushed = 0;
        for line in text.lines() {
            self.push_line(line.to_string());
            pushed += 1;
        }
        pushed
    }

    /// Push a single line, evicting from the front when full
    pub fn push_line(&mut self, line: String) {
        self.lines.push_back(line);
        self.next_seq += 1;
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// The last `n` lines (all of them if fewer exist), oldest first
    pub fn snapshot(&self, n: usize) -> Vec<String> {
        let start = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(start).cloned().collect()
    }

    /// Everything currently held, plus the cursor just past it
    pub fn replay(&self) -> (Vec<String>, u64) {
        (self.lines.iter().cloned().collect(), self.next_seq)
    }

    /// Lines with sequence number `>= cursor`
    pub fn read_since(&self, cursor: u64) -> ConsoleChunk {
        let first = self.first_seq();
        let (start, skipped) = if cursor < first {
            (0, first - cursor)
        } else {
            // A cursor from the future yields nothing rather than panicking.
            let offset = usize::try_from(cursor - first).unwrap_or(usize::MAX);
            (offset.min(self.lines.len()), 0)
        };
        ConsoleChunk {
            lines: self.lines.iter().skip(start).cloned().collect(),
            next: self.next_seq.max(cursor),
            skipped,
        }
    }

    /// Sequence number of the oldest retained line
    pub fn first_seq(&self) -> u64 {
        self.next_seq - self.lines.len() as u64
    }

    /// Total number of lines ever appended
    pub fn end_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}

/// A [`ConsoleBuffer`] behind its own lock
///
/// Cloning shares the same buffer. The lock is only ever held for the
/// duration of a copy, never across an await point.
#[derive(Debug, Clone)]
pub struct ConsoleLog {
    inner: Arc<Mutex<ConsoleBuffer>>,
}

impl ConsoleLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConsoleBuffer::new(capacity))),
        }
    }

    /// See [`ConsoleBuffer::append`]
    pub fn append(&self, text: &str) -> usize {
        self.inner.lock().append(text)
    }

    /// See [`ConsoleBuffer::snapshot`]
    pub fn snapshot(&self, n: usize) -> Vec<String> {
        self.inner.lock().snapshot(n)
    }

    /// See [`ConsoleBuffer::replay`]
    pub fn replay(&self) -> (Vec<String>, u64) {
        self.inner.lock().replay()
    }

    /// See [`ConsoleBuffer::read_since`]
    pub fn read_since(&self, cursor: u64) -> ConsoleChunk {
        self.inner.lock().read_since(cursor)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}
