use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// A formatted log line waiting to be shipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            message: message.into(),
            timestamp,
        }
    }
}

/// Why an event was not buffered. Both variants carry the drop count
/// including this event, so each rejected event sees a distinct number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("event buffer is full ({dropped} dropped so far)")]
    Full { dropped: u64 },

    #[error("event buffer is closed ({dropped} dropped so far)")]
    Closed { dropped: u64 },
}

/// FIFO of pending events shared by producer threads and the publisher.
///
/// Producers only ever hold the lock for a single push, and a full buffer
/// rejects the event instead of waiting for room. Once closed, every new
/// event is rejected while already buffered events can still be drained.
pub struct EventBuffer {
    capacity: Option<usize>,
    queue: Mutex<VecDeque<LogEvent>>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl EventBuffer {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new(Some(capacity))
    }

    /// Appends `event` unless the buffer is at capacity or closed.
    ///
    /// Returns false and counts the drop when the event was rejected.
    pub fn try_enqueue(&self, event: LogEvent) -> bool {
        self.offer(event).is_ok()
    }

    /// Like [`try_enqueue`](Self::try_enqueue), but says why the event was rejected.
    pub fn offer(&self, event: LogEvent) -> Result<(), EnqueueError> {
        let closed = {
            let mut queue = self.lock();
            let closed = self.closed.load(Ordering::Acquire);
            if !closed && self.capacity.map_or(true, |cap| queue.len() < cap) {
                queue.push_back(event);
                return Ok(());
            }
            closed
        };

        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if closed {
            Err(EnqueueError::Closed { dropped })
        } else {
            Err(EnqueueError::Full { dropped })
        }
    }

    /// Rejects all future events. Events already buffered stay drainable.
    pub fn close(&self) {
        let _queue = self.lock();
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Removes up to `max_count` events from the front, oldest first.
    pub fn drain(&self, max_count: usize) -> Vec<LogEvent> {
        let mut queue = self.lock();
        let n = max_count.min(queue.len());
        queue.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Total number of events rejected because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    // A panic while holding the lock cannot leave the deque half-modified,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LogEvent>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::unbounded()
    }
}
