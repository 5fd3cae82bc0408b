//! Engine error taxonomy.
//!
//! Every failure the engine can surface carries a machine-readable
//! [`ErrorCode`] so transports can map it to a status without string
//! matching.

use serde_json::Value;
use thiserror::Error;

use crate::provider::ProviderError;
use crate::store::StoreError;

/// Machine-readable error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    NotFound,
    Routing,
    ToolExecution,
    Llm,
    SchemaValidation,
    Storage,
    Configuration,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorCode {
    /// Stable string form used in error envelopes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Routing => "routing",
            Self::ToolExecution => "tool_execution",
            Self::Llm => "llm",
            Self::SchemaValidation => "schema_validation",
            Self::Storage => "storage",
            Self::Configuration => "configuration",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed request or input above bounds. The `code` names the
    /// violated rule, e.g. `message-empty`, `too-large`, `invalid-id`.
    #[error("validation failed ({code}): {message}")]
    Validation { code: &'static str, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("routing failed: {0}")]
    Routing(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("llm call failed: {0}")]
    Llm(String),

    #[error("response schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("request deadline exceeded")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    /// Invariant violations, including the agent loop turn cap.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        details: Option<Value>,
    },
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Routing(_) => ErrorCode::Routing,
            Self::ToolExecution { .. } => ErrorCode::ToolExecution,
            Self::Llm(_) => ErrorCode::Llm,
            Self::SchemaValidation(_) => ErrorCode::SchemaValidation,
            Self::Storage(_) => ErrorCode::Storage,
            Self::Configuration(_) => ErrorCode::Configuration,
            Self::Timeout => ErrorCode::Timeout,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            details: None,
        }
    }

    pub fn internal_with_details(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details: Some(details),
        }
    }
}

impl From<ProviderError> for EngineError {
    fn from(err: ProviderError) -> Self {
        Self::Llm(err.to_string())
    }
}
