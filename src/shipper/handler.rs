use crate::config::types::{Config, MAX_BATCH_SIZE};
use crate::delivery::{DeliveryAdapter, DestinationIdentity};
use crate::record::{truncate_message, EcsFormatter, Formatter, LogRecord, Severity, SeverityFilter};
use crate::shipper::event_buffer::{EnqueueError, EventBuffer, LogEvent};
use crate::shipper::lifecycle::{LifecycleController, LifecycleState, ScheduleConfig, ShutdownReport};
use crate::shipper::publisher::{BatchPublisher, DEFAULT_MAX_ATTEMPTS};
use crate::shipper::stats::{ShipperStats, StatsSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

/// Report every this many dropped events after the first one.
const DROP_WARN_EVERY: u64 = 1000;

/// The narrow surface a host logging framework needs.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Whether a record of this severity would be kept. Cheap and side-effect free.
    fn should_emit(&self, severity: Severity) -> bool;

    /// Hands over one record. Never blocks and never fails.
    fn submit(&self, record: LogRecord);

    /// Stops periodic publishing and flushes what is still buffered.
    async fn shutdown(&self) -> Option<ShutdownReport>;
}

/// Everything the shipper needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ShipperOptions {
    pub destination: DestinationIdentity,
    pub sequence_token: Option<String>,
    pub buffer_capacity: Option<usize>,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub schedule: ScheduleConfig,
    pub level: Severity,
    /// 0 disables truncation.
    pub max_message_length: usize,
}

impl ShipperOptions {
    pub fn new(destination: DestinationIdentity) -> Self {
        Self {
            destination,
            sequence_token: None,
            buffer_capacity: None,
            batch_size: MAX_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            schedule: ScheduleConfig::default(),
            level: Severity::Info,
            max_message_length: 0,
        }
    }
}

impl From<&Config> for ShipperOptions {
    fn from(config: &Config) -> Self {
        Self {
            destination: config.destination(),
            sequence_token: config.sequence_token.clone(),
            buffer_capacity: config.buffer.capacity,
            batch_size: config.batch.size,
            max_attempts: config.batch.max_attempts,
            schedule: ScheduleConfig {
                initial_delay: config.batch.initial_delay,
                period: config.batch.period,
                shutdown_timeout: config.shutdown_timeout,
            },
            level: config.level,
            max_message_length: config.max_message_length,
        }
    }
}

/// Filters, formats and buffers records, and ships them in the background.
pub struct LogShipper {
    filter: SeverityFilter,
    formatter: Arc<dyn Formatter>,
    max_message_length: usize,
    buffer: Arc<EventBuffer>,
    stats: Arc<ShipperStats>,
    controller: LifecycleController,
}

impl LogShipper {
    /// Builds the shipper and arms its schedule. Must be called from within a tokio runtime.
    pub fn start(
        options: ShipperOptions,
        adapter: Arc<dyn DeliveryAdapter>,
        formatter: Arc<dyn Formatter>,
    ) -> Self {
        let buffer = Arc::new(EventBuffer::new(options.buffer_capacity));
        let stats = Arc::new(ShipperStats::new());

        let publisher = BatchPublisher::new(
            Arc::clone(&buffer),
            adapter,
            options.destination,
            options.sequence_token,
            options.batch_size,
        )
        .with_max_attempts(options.max_attempts)
        .with_stats(Arc::clone(&stats));

        let controller = LifecycleController::start(publisher, options.schedule);

        Self {
            filter: SeverityFilter::new(options.level),
            formatter,
            max_message_length: options.max_message_length,
            buffer,
            stats,
            controller,
        }
    }

    /// Builds a shipper from a loaded config, formatting records as ECS JSON.
    pub fn from_config(config: &Config, adapter: Arc<dyn DeliveryAdapter>) -> Self {
        let formatter = Arc::new(EcsFormatter::new(config.service_environment.clone()));
        Self::start(ShipperOptions::from(config), adapter, formatter)
    }

    /// Formats a record into the event that would be buffered for it.
    pub fn format_event(&self, record: &LogRecord) -> LogEvent {
        let message = truncate_message(self.formatter.format(record), self.max_message_length);
        LogEvent::new(message, Utc::now().timestamp_millis())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats
            .snapshot(self.buffer.dropped_count(), self.buffer.len())
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn state(&self) -> LifecycleState {
        self.controller.state()
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }
}

#[async_trait]
impl LogSink for LogShipper {
    fn should_emit(&self, severity: Severity) -> bool {
        self.filter.should_emit(severity)
    }

    fn submit(&self, record: LogRecord) {
        if !self.filter.should_emit(record.severity) {
            return;
        }

        let event = self.format_event(&record);
        match self.buffer.offer(event) {
            Ok(()) => self.stats.record_enqueued(),
            Err(EnqueueError::Full { dropped }) => {
                if dropped == 1 || dropped % DROP_WARN_EVERY == 0 {
                    warn!(
                        dropped = dropped,
                        capacity = ?self.buffer.capacity(),
                        "Maximum size of the log event buffer reached, consider increasing buffer.capacity"
                    );
                }
            }
            // Shut down: nothing will drain the buffer again
            Err(EnqueueError::Closed { .. }) => {}
        }
    }

    /// Closes the buffer to new records, then stops the schedule and flushes.
    async fn shutdown(&self) -> Option<ShutdownReport> {
        self.buffer.close();
        self.controller.shutdown().await
    }
}
