//! Bounded captured-log ring backing the `LOGS` command.
//!
//! A [`LogCaptureLayer`] installed next to the fmt subscriber copies
//! every event's formatted message into a fixed-capacity ring; the
//! command surface drains it on request. When the ring is full the
//! oldest line is dropped.

use std::fmt;
use std::sync::{Arc, Mutex};

use heapless::Deque;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use triax_common::consts::LOG_QUEUE_DEPTH;

/// Shared handle to the captured-log ring.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<Deque<String, LOG_QUEUE_DEPTH>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Deque::new())),
        }
    }

    pub fn push(&self, line: String) {
        let mut ring = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if ring.is_full() {
            ring.pop_front();
        }
        // Cannot fail after the pop above.
        let _ = ring.push_back(line);
    }

    /// Remove and return up to `n` oldest lines.
    pub fn drain(&self, n: usize) -> Vec<String> {
        let mut ring = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let take = n.min(ring.len());
        (0..take).filter_map(|_| ring.pop_front()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracing layer feeding a [`LogBuffer`].
pub struct LogCaptureLayer {
    buffer: LogBuffer,
}

impl LogCaptureLayer {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for LogCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        self.buffer
            .push(format!("[{}] {}: {}", meta.level(), meta.target(), visitor.message));
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}
