//! Error types for the Skein overlay

use thiserror::Error;

use crate::Endpoint;

/// Core Skein errors
///
/// Protocol outcomes such as a missing reply, a rejected admission or a
/// dropped flood are not errors. They are returned as plain values by the
/// operations that produce them.
#[derive(Error, Debug)]
pub enum SkeinError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    #[error("Unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    #[error("Payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Delivery to {0} failed after retries")]
    DeliveryFailed(Endpoint),

    // Config errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Auth errors
    #[error("Authentication failed for {0}")]
    AuthenticationFailed(String),

    #[error("Not authenticated")]
    NotAuthenticated,
}

impl From<std::io::Error> for SkeinError {
    fn from(err: std::io::Error) -> Self {
        SkeinError::TransportError(err.to_string())
    }
}

/// Result type for Skein operations
pub type SkeinResult<T> = Result<T, SkeinError>;
