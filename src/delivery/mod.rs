pub mod http;

use crate::shipper::LogEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use http::HttpDelivery;

/// The log group and stream every batch of this handler is written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationIdentity {
    pub group_name: String,
    pub stream_name: String,
}

impl DestinationIdentity {
    pub fn new(group_name: impl Into<String>, stream_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            stream_name: stream_name.into(),
        }
    }
}

impl fmt::Display for DestinationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_name, self.stream_name)
    }
}

/// Why a delivery attempt failed.
///
/// Only `OrderingConflict` is retried. Every other variant is a transport
/// failure and abandons the batch on the first attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The supplied sequence token was stale; the server told us which one it expects.
    #[error("invalid sequence token, expected {expected:?}")]
    OrderingConflict { expected: Option<String> },

    /// Adapter-defined failure for adapters that do not speak HTTP.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ingestion service returned status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DeliveryError {
    pub fn is_ordering_conflict(&self) -> bool {
        matches!(self, DeliveryError::OrderingConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Writes one batch to the remote stream.
///
/// On success returns the token to present with the next write (`None` when
/// the service does not hand one out).
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    async fn put_batch(
        &self,
        destination: &DestinationIdentity,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_display() {
        let dest = DestinationIdentity::new("app-logs", "host-1");
        assert_eq!(dest.to_string(), "app-logs/host-1");
    }

    #[test]
    fn test_only_conflicts_are_ordering_errors() {
        let conflict = DeliveryError::OrderingConflict {
            expected: Some("42".to_string()),
        };
        assert!(conflict.is_ordering_conflict());
        assert!(!DeliveryError::Transport("boom".to_string()).is_ordering_conflict());
        assert!(!DeliveryError::Rejected {
            status: 500,
            message: String::new()
        }
        .is_ordering_conflict());
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!DeliveryError::from(decode).is_ordering_conflict());
    }
}
