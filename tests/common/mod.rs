use async_trait::async_trait;
use logship::delivery::{DeliveryAdapter, DeliveryError, DestinationIdentity, Result};
use logship::LogEvent;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum Reply {
    Accept(Option<String>),
    Conflict(Option<String>),
    Fail,
}

impl Reply {
    pub fn accept(token: &str) -> Self {
        Reply::Accept(Some(token.to_string()))
    }

    pub fn conflict(expected: &str) -> Self {
        Reply::Conflict(Some(expected.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub destination: DestinationIdentity,
    pub events: Vec<LogEvent>,
    pub token: Option<String>,
}

/// Delivery stub that answers from a script and records every call.
/// Once the script runs out it keeps answering with `fallback`.
pub struct ScriptedDelivery {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedDelivery {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self::new(Vec::new(), reply)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliveryAdapter for ScriptedDelivery {
    async fn put_batch(
        &self,
        destination: &DestinationIdentity,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(RecordedCall {
            destination: destination.clone(),
            events: events.to_vec(),
            token: sequence_token.map(str::to_string),
        });

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Accept(token) => Ok(token),
            Reply::Conflict(expected) => Err(DeliveryError::OrderingConflict { expected }),
            Reply::Fail => Err(DeliveryError::Transport("service unavailable".to_string())),
        }
    }
}
