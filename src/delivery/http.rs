use super::{DeliveryAdapter, DeliveryError, DestinationIdentity, Result};
use crate::config::types::EndpointConfig;
use crate::shipper::LogEvent;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// JSON-over-HTTP client for an ingestion service speaking the sequence-token protocol.
#[derive(Debug)]
pub struct HttpDelivery {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDelivery {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn put_url(&self) -> String {
        format!("{}/put-log-events", self.base_url)
    }
}

#[async_trait]
impl DeliveryAdapter for HttpDelivery {
    async fn put_batch(
        &self,
        destination: &DestinationIdentity,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>> {
        let body = PutLogEventsRequest {
            group_name: &destination.group_name,
            stream_name: &destination.stream_name,
            sequence_token,
            events,
        };

        let response = self.client.post(self.put_url()).json(&body).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            return parse_success(&body);
        }

        let message = response.text().await.unwrap_or_default();
        Err(classify_failure(status, message))
    }
}

/// Reads the next token from a 2xx body. An empty body (e.g. 204) carries no token.
fn parse_success(body: &str) -> Result<Option<String>> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let parsed: PutLogEventsResponse = serde_json::from_str(body)?;
    Ok(parsed.next_sequence_token)
}

/// Maps a non-2xx response onto the delivery error taxonomy.
fn classify_failure(status: StatusCode, message: String) -> DeliveryError {
    if status == StatusCode::CONFLICT || status == StatusCode::BAD_REQUEST {
        if let Ok(body) = serde_json::from_str::<InvalidTokenBody>(&message) {
            if body.error.as_deref() == Some(INVALID_TOKEN_ERROR)
                || body.expected_sequence_token.is_some()
            {
                return DeliveryError::OrderingConflict {
                    expected: body.expected_sequence_token,
                };
            }
        }
    }

    DeliveryError::Rejected {
        status: status.as_u16(),
        message,
    }
}

const INVALID_TOKEN_ERROR: &str = "InvalidSequenceToken";

// ===== Wire Types =====

#[derive(Debug, Serialize)]
struct PutLogEventsRequest<'a> {
    group_name: &'a str,
    stream_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
    events: &'a [LogEvent],
}

#[derive(Debug, Deserialize)]
struct PutLogEventsResponse {
    #[serde(default)]
    next_sequence_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvalidTokenBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    expected_sequence_token: Option<String>,
}
