use super::LogRecord;
use chrono::SecondsFormat;
use serde_json::{Map, Value};

/// Appended to messages cut down to the configured maximum length.
pub const TRUNCATION_MARKER: &str = " (...)";

const ECS_VERSION: &str = "1.2.0";

/// Turns one record into a transport-ready string.
pub trait Formatter: Send + Sync {
    fn format(&self, record: &LogRecord) -> String;
}

impl<F> Formatter for F
where
    F: Fn(&LogRecord) -> String + Send + Sync,
{
    fn format(&self, record: &LogRecord) -> String {
        self(record)
    }
}

/// Renders records as single-line Elastic Common Schema JSON documents.
#[derive(Debug, Clone, Default)]
pub struct EcsFormatter {
    service_environment: Option<String>,
}

impl EcsFormatter {
    pub fn new(service_environment: Option<String>) -> Self {
        Self {
            service_environment,
        }
    }
}

impl Formatter for EcsFormatter {
    fn format(&self, record: &LogRecord) -> String {
        let mut doc = Map::new();
        doc.insert(
            "@timestamp".to_string(),
            Value::String(record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        doc.insert(
            "log.level".to_string(),
            Value::String(record.severity.as_str().to_string()),
        );
        doc.insert("message".to_string(), Value::String(record.rendered_message()));
        doc.insert(
            "ecs.version".to_string(),
            Value::String(ECS_VERSION.to_string()),
        );

        if let Some(logger) = &record.logger {
            doc.insert("log.logger".to_string(), Value::String(logger.clone()));
        }
        if let Some(thread) = &record.thread {
            doc.insert(
                "process.thread.name".to_string(),
                Value::String(thread.clone()),
            );
        }
        if let Some(error) = &record.error {
            doc.insert("error.message".to_string(), Value::String(error.clone()));
        }
        if let Some(env) = &self.service_environment {
            doc.insert("service.environment".to_string(), Value::String(env.clone()));
        }

        Value::Object(doc).to_string()
    }
}

/// Bounds `message` to `max_len` characters, ending it with [`TRUNCATION_MARKER`].
///
/// A `max_len` of 0 disables truncation. Lengths count `char`s, so a cut never
/// lands inside a code point.
pub fn truncate_message(message: String, max_len: usize) -> String {
    if max_len == 0 {
        return message;
    }

    let len = message.chars().count();
    if len <= max_len {
        return message;
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_len < marker_len {
        return TRUNCATION_MARKER.chars().take(max_len).collect();
    }

    let keep = max_len - marker_len;
    let cut = message
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(message.len());

    let mut truncated = String::with_capacity(cut + TRUNCATION_MARKER.len());
    truncated.push_str(&message[..cut]);
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
