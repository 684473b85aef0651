use crate::delivery::DestinationIdentity;
use crate::record::Severity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest batch a single put call may carry.
pub const MAX_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub destination: DestinationConfig,
    /// Token to present with the very first write; usually absent for a new stream.
    #[serde(default)]
    pub sequence_token: Option<String>,
    #[serde(default = "default_level")]
    pub level: Severity,
    #[serde(default)]
    pub service_environment: Option<String>,
    /// 0 disables truncation.
    #[serde(default)]
    pub max_message_length: usize,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    #[serde(default)]
    pub endpoint: Option<EndpointConfig>,
}

impl Config {
    /// Destination for this process. Falls back to the host name when no stream is configured.
    pub fn destination(&self) -> DestinationIdentity {
        let stream_name = self
            .destination
            .stream_name
            .clone()
            .unwrap_or_else(default_stream_name);
        DestinationIdentity::new(self.destination.group_name.clone(), stream_name)
    }
}

fn default_level() -> Severity {
    Severity::Info
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(60)
}

pub fn default_stream_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "logship".to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub group_name: String,
    #[serde(default)]
    pub stream_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Maximum number of pending events; unbounded when absent.
    #[serde(default)]
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    #[serde(default = "default_batch_period", with = "humantime_serde")]
    pub period: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            period: default_batch_period(),
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
        }
    }
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_batch_period() -> Duration {
    Duration::from_secs(5)
}

fn default_max_attempts() -> u32 {
    crate::shipper::publisher::DEFAULT_MAX_ATTEMPTS
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(5)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default = "default_endpoint_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_endpoint_timeout() -> Duration {
    Duration::from_secs(30)
}
