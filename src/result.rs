//! Outcome of one execution and its JSON shape.

use axum::http::StatusCode;
use serde::{Serialize, Serializer};
use std::fmt;

/// Machine-readable failure class, serialized as `error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Execution,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Execution => "execution",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Success {
        output: String,
        execution_time_secs: f64,
        model_used: String,
    },
    Failure {
        error_message: String,
        error_kind: ErrorKind,
        exit_code: Option<i32>,
    },
}

impl ExecutionResult {
    pub fn failure(error_kind: ErrorKind, error_message: impl Into<String>) -> Self {
        ExecutionResult::Failure {
            error_message: error_message.into(),
            error_kind,
            exit_code: None,
        }
    }

    pub fn validation(error_message: impl Into<String>) -> Self {
        Self::failure(ErrorKind::Validation, error_message)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::Failure { error_kind, .. } => Some(*error_kind),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.error_kind() {
            None => StatusCode::OK,
            Some(ErrorKind::Validation) => StatusCode::BAD_REQUEST,
            Some(ErrorKind::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Some(ErrorKind::Execution | ErrorKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape: `success` plus either the output fields or the error fields.
#[derive(Serialize)]
struct ResultBody<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self {
            ExecutionResult::Success {
                output,
                execution_time_secs,
                model_used,
            } => ResultBody {
                success: true,
                output: Some(output.as_str()),
                execution_time: Some(*execution_time_secs),
                model: Some(model_used.as_str()),
                error: None,
                error_type: None,
                exit_code: None,
            },
            ExecutionResult::Failure {
                error_message,
                error_kind,
                exit_code,
            } => ResultBody {
                success: false,
                output: None,
                execution_time: None,
                model: None,
                error: Some(error_message.as_str()),
                error_type: Some(*error_kind),
                exit_code: *exit_code,
            },
        };
        body.serialize(serializer)
    }
}

/// Round to two decimals for `execution_time` and `uptime`.
pub fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
