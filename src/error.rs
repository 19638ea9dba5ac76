//! Error types for Flowsync.
//!
//! All errors in Flowsync are represented by the `FlowsyncError` enum,
//! which provides specific variants for different error categories.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Flowsync operations.
///
/// The type is `Clone` so that one in-flight request can hand the same
/// failure to every caller waiting on it.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum FlowsyncError {
    /// Client construction or runtime wiring errors.
    #[error("{0}")]
    Client(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML, etc.).
    #[error("{0}")]
    Convert(String),

    /// Transport failures: connection refused, DNS, broken body.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response returned by the backend.
    #[error("api error {status}: {message}")]
    Api {
        status: u16,
        message: String,
    },

    /// Request rejected as malformed or missing required fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist (or was soft-deleted).
    #[error("{0} not found")]
    NotFound(String),

    /// Canvas-level invariant violations.
    #[error("{0}")]
    Canvas(String),

    /// Node definition or configuration errors.
    #[error("{0}")]
    Node(String),

    /// Edge definition errors.
    #[error("{0}")]
    Edge(String),

    /// Query cache errors.
    #[error("{0}")]
    Cache(String),

    /// Execution poller errors.
    #[error("{0}")]
    Poller(String),

    /// Runtime errors (missing tokio runtime, task failures).
    #[error("{0}")]
    Runtime(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl FlowsyncError {
    /// Builds an error from a non-success HTTP status and the server message.
    pub fn from_status(
        status: u16,
        message: String,
    ) -> Self {
        match status {
            400 | 422 => FlowsyncError::Validation(message),
            404 => FlowsyncError::NotFound(message),
            _ => FlowsyncError::Api {
                status,
                message,
            },
        }
    }
}

impl From<FlowsyncError> for String {
    fn from(val: FlowsyncError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for FlowsyncError {
    fn from(error: std::io::Error) -> Self {
        FlowsyncError::IoError(error.to_string())
    }
}

impl From<FlowsyncError> for std::io::Error {
    fn from(val: FlowsyncError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for FlowsyncError {
    fn from(_: FromUtf8Error) -> Self {
        FlowsyncError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for FlowsyncError {
    fn from(error: serde_json::Error) -> Self {
        FlowsyncError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for FlowsyncError {
    fn from(error: toml::de::Error) -> Self {
        FlowsyncError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for FlowsyncError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => FlowsyncError::from_status(status.as_u16(), error.to_string()),
            None if error.is_decode() => FlowsyncError::Convert(error.to_string()),
            None => FlowsyncError::Network(error.to_string()),
        }
    }
}

impl From<jsonschema::ValidationError<'_>> for FlowsyncError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        FlowsyncError::Node(error.to_string())
    }
}

#[cfg(test)]
mod test {
    use crate::FlowsyncError;

    #[test]
    fn test_from_status() {
        assert_eq!(FlowsyncError::from_status(422, "name is required".into()), FlowsyncError::Validation("name is required".into()));
        assert_eq!(FlowsyncError::from_status(404, "workflow w1".into()), FlowsyncError::NotFound("workflow w1".into()));
        assert_eq!(
            FlowsyncError::from_status(503, "unavailable".into()),
            FlowsyncError::Api {
                status: 503,
                message: "unavailable".into()
            }
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(FlowsyncError::NotFound("workflow w1".into()).to_string(), "workflow w1 not found");
    }
}
