use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A payload delivered by the broker on a named channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// e.g., "market/tick" or "area/house-1/response"
    pub channel: String,
    /// Opaque bytes as published; JSON text for structured messages.
    pub payload: Vec<u8>,
    pub published_at: DateTime<Utc>,
}

impl Message {
    pub fn new(channel: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
            published_at: Utc::now(),
        }
    }

    /// View the payload as UTF-8 text.
    pub fn payload_str(&self) -> Result<&str, BridgeError> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| BridgeError::Serialization(format!("payload on {} is not UTF-8: {e}", self.channel)))
    }

    /// Decode a payload that was published with `publish_json`.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, BridgeError> {
        serde_json::from_slice(&self.payload).map_err(|e| BridgeError::Serialization(e.to_string()))
    }
}

/// Global error type spanning broker failures, worker lifecycle faults and
/// misuse of the single-worker bridges.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("bridge {bridge} already owns an active worker; terminate it before subscribing again")]
    WorkerAlreadyActive { bridge: Uuid },

    #[error("Broker Error: {0}")]
    Broker(String),

    #[error("Broker connection is closed")]
    BrokerClosed,

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    #[error("Worker {worker} did not stop within {timeout_ms} ms")]
    JoinTimeout { worker: String, timeout_ms: u64 },

    #[error("Worker {0} panicked")]
    WorkerPanicked(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}
