//! Error envelope and status mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use palaver_core::error::{EngineError, ErrorCode};

/// The `{error, code, details?}` envelope every non-2xx response carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        let details = match err {
            EngineError::Internal { details, .. } => details.clone(),
            EngineError::ToolExecution { tool, .. } => {
                Some(serde_json::json!({ "tool": tool }))
            }
            _ => None,
        };
        Self {
            error: err.to_string(),
            code: err.code().as_str().to_string(),
            details,
        }
    }
}

/// HTTP status for an error code: Validation/Routing → 400,
/// NotFound → 404, Timeout → 504, everything else → 500.
pub fn http_status(code: ErrorCode) -> u16 {
    match code {
        ErrorCode::Validation | ErrorCode::Routing => 400,
        ErrorCode::NotFound => 404,
        ErrorCode::Timeout => 504,
        _ => 500,
    }
}
