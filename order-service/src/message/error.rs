//! 消息总线错误类型

use std::time::Duration;

use thiserror::Error;

/// Broker / transport failures
///
/// Carries only strings so the error can be cloned into every subscriber of
/// a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Subscriber lagged behind, {0} messages skipped")]
    Lagged(u64),

    #[error("Channel closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

/// Request bridge failures
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Response timeout expired after {0:?}")]
    Timeout(Duration),

    #[error("Failed to encode request: {0}")]
    Encode(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The responder answered with a failure reply
    #[error("{0}")]
    Remote(String),
}

/// Errors returned by a responder operation
///
/// The `Display` text is what the caller receives as the failure reason.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Invalid request payload: {0}")]
    Decode(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage failure: {0}")]
    Store(String),
}

impl From<serde_json::Error> for OperationError {
    fn from(e: serde_json::Error) -> Self {
        OperationError::Decode(e.to_string())
    }
}

impl OperationError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
