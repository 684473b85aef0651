//! Feeds `tracing` events into a [`LogSink`].
//!
//! ```rust,ignore
//! let shipper = Arc::new(LogShipper::from_config(&config, adapter));
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(ShipperLayer::new(shipper.clone()))
//!     .init();
//! ```

use crate::record::{LogRecord, Severity};
use crate::shipper::LogSink;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Targets whose events are never shipped. The shipper's own diagnostics and
/// the HTTP stack it drives would otherwise feed back into the buffer.
pub const DEFAULT_IGNORED_TARGETS: &[&str] = &["logship", "reqwest", "hyper", "h2", "rustls"];

pub struct ShipperLayer {
    sink: Arc<dyn LogSink>,
    ignored_targets: Vec<String>,
}

impl ShipperLayer {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            ignored_targets: DEFAULT_IGNORED_TARGETS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }

    pub fn ignore_target(mut self, target: impl Into<String>) -> Self {
        self.ignored_targets.push(target.into());
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|prefix| {
            target == prefix
                || target
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }
}

impl<S> Layer<S> for ShipperLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let severity = Severity::from(*metadata.level());

        if !self.sink.should_emit(severity) || self.is_ignored(metadata.target()) {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(severity, visitor.render()).with_logger(metadata.target());
        record.error = visitor.error;
        self.sink.submit(record);
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: Vec<String>,
    error: Option<String>,
}

impl RecordVisitor {
    fn render(&self) -> String {
        if self.fields.is_empty() {
            return self.message.clone();
        }
        if self.message.is_empty() {
            return self.fields.join(" ");
        }
        format!("{} {}", self.message, self.fields.join(" "))
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "error" => self.error = Some(value.to_string()),
            name => self.fields.push(format!("{}={}", name, value)),
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if field.name() == "error" {
            self.error = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "error" => self.error = Some(format!("{:?}", value)),
            name => self.fields.push(format!("{}={:?}", name, value)),
        }
    }
}
