//! Client error types

use crate::message::MessageError;
use thiserror::Error;

/// Client error type
#[derive(Error, Debug)]
pub enum ClientError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wire message could not be encoded or decoded
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Relay error response
    #[error("Relay error: {0}")]
    RelayError(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Invalid event
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// No relays to talk to
    #[error("No relays configured")]
    NoRelays,
}

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;
