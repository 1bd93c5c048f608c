//! # API Error Type
//!
//! What the kiosk shell prints when a command fails.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ValidationError ──► CoreError ──► EngineError ──► ApiError ──► stderr  │
//! │                                        ▲                                │
//! │                      DbError ──────────┘                                │
//! │                                                                         │
//! │  {                                                                      │
//! │    "code": "INSUFFICIENT_CREDITS",                                      │
//! │    "message": "Insufficient credits: balance 0, requested 1",           │
//! │    "retryable": false                                                   │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use totem_core::ErrorKind;
use totem_engine::EngineError;

/// Error returned from kiosk commands.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorKind,

    /// Human-readable error message for display
    pub message: String,

    /// Whether starting over may succeed
    pub retryable: bool,
}

impl ApiError {
    pub fn new(code: ErrorKind, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            retryable: false,
        }
    }

    /// Bad command line.
    pub fn usage(message: impl Into<String>) -> Self {
        ApiError::new(ErrorKind::InvalidInput, message)
    }

    /// Renders as pretty JSON, falling back to the plain message.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        if let EngineError::Storage(message) = &err {
            // Keep SQL details in the log, not on the kiosk screen
            tracing::error!("Storage failure: {}", message);
            return ApiError {
                code: ErrorKind::Storage,
                message: "Database operation failed".to_string(),
                retryable: true,
            };
        }

        ApiError {
            code: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
