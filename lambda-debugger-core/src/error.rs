//! Invocation error kinds and their JSON wire format

use serde::Serialize;
use thiserror::Error;

/// Error kinds surfaced by the invocation endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Request
    InvalidRequest,

    // Handler resolution
    InvalidSpec,
    FileNotFound,
    FileRead,
    ModuleEvaluation,
    ExportNotFound,
    ExportNotCallable,

    // Handler execution
    HandlerRuntimeError,
    HandlerNeverSettled,
    ResultSerialization,

    // Server
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::InvalidSpec => "InvalidSpec",
            Self::FileNotFound => "FileNotFound",
            Self::FileRead => "FileRead",
            Self::ModuleEvaluation => "ModuleEvaluation",
            Self::ExportNotFound => "ExportNotFound",
            Self::ExportNotCallable => "ExportNotCallable",
            Self::HandlerRuntimeError => "HandlerRuntimeError",
            Self::HandlerNeverSettled => "HandlerNeverSettled",
            Self::ResultSerialization => "ResultSerialization",
            Self::InternalError => "InternalError",
        }
    }

    /// Resolution and execution failures are all reported as 500; only a
    /// malformed request is the caller's fault.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::InvalidSpec
            | Self::FileNotFound
            | Self::FileRead
            | Self::ModuleEvaluation
            | Self::ExportNotFound
            | Self::ExportNotCallable
            | Self::HandlerRuntimeError
            | Self::HandlerNeverSettled
            | Self::ResultSerialization
            | Self::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed invocation, ready to be rendered as a response body
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct InvocationFailure {
    pub code: ErrorCode,
    pub message: String,
    pub stack: Option<String>,
}

impl InvocationFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Format as the `/invoke` failure body
    ///
    /// Request-level errors carry only `error`; everything else follows the
    /// `{success:false, error, errorType, stack?}` shape.
    pub fn to_json(&self) -> serde_json::Value {
        if self.code == ErrorCode::InvalidRequest {
            return serde_json::json!({ "error": self.message });
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct FailureBody<'a> {
            success: bool,
            error: &'a str,
            error_type: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            stack: Option<&'a str>,
        }

        let body = FailureBody {
            success: false,
            error: &self.message,
            error_type: self.code.as_str(),
            stack: self.stack.as_deref(),
        };

        serde_json::to_value(&body).unwrap_or_else(|_| {
            serde_json::json!({ "success": false, "error": self.message })
        })
    }
}
