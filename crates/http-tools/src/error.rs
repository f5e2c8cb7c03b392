//! Error types for `specbridge-http-tools`.

use crate::safety::sanitize_reqwest_error;
use rmcp::model::{ErrorCode, ErrorData};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// A supplied argument that could not be coerced to its declared schema type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionFailure {
    pub name: String,
    pub expected: String,
    pub value: Value,
}

#[derive(Debug, Error)]
pub enum HttpToolsError {
    #[error("config error: {0}")]
    Config(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("missing required parameters: {}", .missing.join(", "))]
    MissingParameters {
        missing: Vec<String>,
        /// Input schema of the tool, echoed back so callers can correct the call.
        input_schema: Value,
    },

    #[error("invalid parameter values: {}", describe_failures(.failures))]
    ParameterConversion { failures: Vec<ConversionFailure> },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("API returned {status} {reason}: {body}")]
    RemoteHttp {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("http transport error: {0}")]
    Transport(String),

    #[error("tool call cancelled")]
    Cancelled,

    #[error("runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(sanitize_reqwest_error(&value))
    }
}

fn describe_failures(failures: &[ConversionFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("'{}' expected {} but got {}", f.name, f.expected, f.value))
        .collect::<Vec<_>>()
        .join("; ")
}

impl HttpToolsError {
    /// Whether the caller can fix this by changing the arguments.
    #[must_use]
    pub fn is_invalid_params(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound(_) | Self::MissingParameters { .. } | Self::ParameterConversion { .. }
        )
    }

    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        if self.is_invalid_params() {
            ErrorCode::INVALID_PARAMS
        } else {
            ErrorCode::INTERNAL_ERROR
        }
    }

    fn error_data(&self) -> Option<Value> {
        match self {
            Self::MissingParameters {
                missing,
                input_schema,
            } => Some(json!({
                "missing": missing,
                "inputSchema": input_schema,
            })),
            Self::ParameterConversion { failures } => Some(json!({ "invalid": failures })),
            Self::RemoteHttp { status, body, .. } => Some(json!({
                "status": status,
                "body": body,
            })),
            _ => None,
        }
    }
}

impl From<HttpToolsError> for ErrorData {
    fn from(value: HttpToolsError) -> Self {
        ErrorData::new(value.error_code(), value.to_string(), value.error_data())
    }
}
