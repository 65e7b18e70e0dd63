//! Common error types for Outbox.

use thiserror::Error;

/// Top-level error type for Outbox operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The network could not be reached (DNS, refused, reset, TLS...).
    #[error("Network error: {0}")]
    Network(String),

    /// An operation did not complete within its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The durable queue could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The operation carries data that cannot be stored in the queue.
    #[error("Unsupported payload: {0}")]
    UnsupportedPayload(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether this error means the remote side was unreachable, as opposed
    /// to reachable but refusing the request.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
