//! Shared error types for the flow client.

use thiserror::Error;

/// Errors returned by the flow HTTP endpoints.
///
/// A non-200 response is reported as [`ApiError::Http`] with the raw body so
/// callers can log what the gateway actually said. Nothing here is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}

impl ApiError {
    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// An envelope whose `type` cannot be turned into a state key.
///
/// This points at a protocol mismatch with the upstream event producer, so it
/// is always returned to the caller instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error(
        "malformed envelope type '{msg_type}' on topic '{topic}': \
         expected at least two dot-separated segments with a non-empty entity"
    )]
    Malformed { topic: String, msg_type: String },
}
