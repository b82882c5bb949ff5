//! Error taxonomy surfaced to tool callers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Machine-readable error category carried in every error payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing file, model id or tool.
    NotFound,
    /// Input file is not valid tabular data.
    ParseError,
    /// Input is well-formed but incompatible with the request.
    ValidationError,
    /// The fitting procedure failed.
    TrainingFailure,
    /// Unexpected I/O or runtime fault.
    Internal,
}

impl ErrorKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::ParseError => "parse_error",
            Self::ValidationError => "validation_error",
            Self::TrainingFailure => "training_failure",
            Self::Internal => "internal",
        }
    }
}

/// Canonical error type for the plugin core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PluginError {
    /// Missing file, model id or tool.
    #[error("not found: {0}")]
    NotFound(String),
    /// Malformed tabular input.
    #[error("parse error: {0}")]
    Parse(String),
    /// Incompatible or insufficient input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Fitting diverged, panicked or was aborted.
    #[error("training failure: {0}")]
    TrainingFailure(String),
    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the crate.
pub type PluginResult<T> = Result<T, PluginError>;

impl PluginError {
    /// Not-found helper.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Parse helper.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Validation helper.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Training failure helper.
    pub fn training(msg: impl Into<String>) -> Self {
        Self::TrainingFailure(msg.into())
    }

    /// Internal error helper.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Category of the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Parse(_) => ErrorKind::ParseError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::TrainingFailure(_) => ErrorKind::TrainingFailure,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::Parse(msg)
            | Self::Validation(msg)
            | Self::TrainingFailure(msg)
            | Self::Internal(msg) => msg,
        }
    }

    /// Structured payload returned to tool callers.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.message(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_kind_and_message() {
        let err = PluginError::not_found("model `model_9` is not registered");
        let payload = err.to_payload();
        assert_eq!(payload["error"]["kind"], "not_found");
        assert_eq!(
            payload["error"]["message"],
            "model `model_9` is not registered"
        );
    }

    #[test]
    fn kinds_serialize_to_wire_names() {
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::ParseError,
            ErrorKind::ValidationError,
            ErrorKind::TrainingFailure,
            ErrorKind::Internal,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
    }
}
