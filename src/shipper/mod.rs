pub mod event_buffer;
pub mod handler;
pub mod lifecycle;
pub mod publisher;
pub mod stats;

pub use event_buffer::{EnqueueError, EventBuffer, LogEvent};
pub use handler::{LogShipper, LogSink, ShipperOptions};
pub use lifecycle::{LifecycleController, LifecycleState, ScheduleConfig, ShutdownReport};
pub use publisher::{BatchPublisher, LossReason, PublishOutcome, DEFAULT_MAX_ATTEMPTS};
pub use stats::{ShipperStats, StatsSnapshot};
