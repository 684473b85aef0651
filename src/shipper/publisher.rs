use crate::delivery::{DeliveryAdapter, DeliveryError, DestinationIdentity};
use crate::shipper::event_buffer::{EventBuffer, LogEvent};
use crate::shipper::stats::ShipperStats;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default number of delivery attempts for one batch when the token keeps going stale.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// What happened to the batch drained by one publisher run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Nothing was buffered; no delivery call was made.
    Empty,
    Delivered { events: usize, attempts: u32 },
    Lost {
        events: usize,
        attempts: u32,
        reason: LossReason,
    },
}

impl PublishOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            PublishOutcome::Empty => 0,
            PublishOutcome::Delivered { attempts, .. } | PublishOutcome::Lost { attempts, .. } => {
                *attempts
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LossReason {
    /// Every attempt was answered with an ordering conflict.
    RetriesExhausted,
    /// A non-ordering failure; these are never retried.
    Transport(String),
    /// The delivery attempt panicked.
    Internal(String),
}

/// Drains the buffer one batch at a time and writes it using the sequence-token protocol.
///
/// The publisher owns the stream's sequence token. Runs take `&mut self`, so
/// whoever holds the publisher is the token's only reader and writer.
pub struct BatchPublisher {
    buffer: Arc<EventBuffer>,
    adapter: Arc<dyn DeliveryAdapter>,
    destination: DestinationIdentity,
    sequence_token: Option<String>,
    batch_size: usize,
    max_attempts: u32,
    stats: Arc<ShipperStats>,
}

impl BatchPublisher {
    pub fn new(
        buffer: Arc<EventBuffer>,
        adapter: Arc<dyn DeliveryAdapter>,
        destination: DestinationIdentity,
        sequence_token: Option<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            buffer,
            adapter,
            destination,
            sequence_token,
            batch_size: batch_size.max(1),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            stats: Arc::new(ShipperStats::new()),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_stats(mut self, stats: Arc<ShipperStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn sequence_token(&self) -> Option<&str> {
        self.sequence_token.as_deref()
    }

    pub fn destination(&self) -> &DestinationIdentity {
        &self.destination
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Events still waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drains at most one batch and delivers it.
    ///
    /// Never fails: every failure, including a panicking adapter, is logged and
    /// reported as [`PublishOutcome::Lost`].
    pub async fn publish(&mut self) -> PublishOutcome {
        let batch = self.buffer.drain(self.batch_size);
        if batch.is_empty() {
            return PublishOutcome::Empty;
        }

        let events = batch.len();
        let result = AssertUnwindSafe(self.deliver(&batch)).catch_unwind().await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    destination = %self.destination,
                    events = events,
                    panic = %message,
                    "Log delivery panicked, events from the current batch will not be sent"
                );
                PublishOutcome::Lost {
                    events,
                    attempts: 0,
                    reason: LossReason::Internal(message),
                }
            }
        };

        match &outcome {
            PublishOutcome::Delivered { events, .. } => self.stats.record_delivered(*events),
            PublishOutcome::Lost { events, .. } => self.stats.record_lost(*events),
            PublishOutcome::Empty => {}
        }

        outcome
    }

    async fn deliver(&mut self, batch: &[LogEvent]) -> PublishOutcome {
        let events = batch.len();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.stats.record_attempt();

            let result = self
                .adapter
                .put_batch(&self.destination, batch, self.sequence_token.as_deref())
                .await;

            match result {
                Ok(next_token) => {
                    debug!(
                        destination = %self.destination,
                        events = events,
                        attempt = attempt,
                        "Delivered log batch"
                    );
                    self.sequence_token = next_token;
                    return PublishOutcome::Delivered {
                        events,
                        attempts: attempt,
                    };
                }
                Err(DeliveryError::OrderingConflict { expected }) => {
                    self.stats.record_conflict();
                    debug!(
                        destination = %self.destination,
                        attempt = attempt,
                        expected = ?expected,
                        "Delivery rejected because of an invalid sequence token"
                    );
                    self.sequence_token = expected;

                    if attempt >= self.max_attempts {
                        warn!(
                            destination = %self.destination,
                            events = events,
                            attempts = attempt,
                            "Too many retries for a log batch, events from the current batch will not be sent"
                        );
                        return PublishOutcome::Lost {
                            events,
                            attempts: attempt,
                            reason: LossReason::RetriesExhausted,
                        };
                    }
                }
                Err(e) => {
                    error!(
                        destination = %self.destination,
                        events = events,
                        attempt = attempt,
                        error = %e,
                        "Log delivery failed, events from the current batch will not be sent"
                    );
                    return PublishOutcome::Lost {
                        events,
                        attempts: attempt,
                        reason: LossReason::Transport(e.to_string()),
                    };
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
