//! # Engine Error Types
//!
//! What callers of the engine see. Every variant maps to one machine-readable
//! [`ErrorKind`] and carries a human-readable message.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Drawer      │  │    Hardware     │  │        Credits          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Busy           │  │  Unavailable    │  │  LedgerWrite            │ │
//! │  │                 │  │  Timeout        │  │  InsufficientCredits    │ │
//! │  │                 │  │  SensorFault    │  │  InvalidAmount          │ │
//! │  │                 │  │                 │  │  UnlockAfterSpend       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Plumbing: NotFound, Validation, InvalidTransition, Storage,    │   │
//! │  │            Config                                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use totem_core::{CoreError, ErrorKind, ValidationError};
use totem_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Drawer
    // =========================================================================
    /// The drawer already has a non-terminal deposit. Try again later.
    #[error("Drawer {drawer_id} is busy")]
    Busy {
        drawer_id: String,
        transaction_id: Option<String>,
    },

    // =========================================================================
    // Hardware
    // =========================================================================
    /// Lock/unlock actuator did not respond.
    #[error("Drawer hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// The drawer-closed signal never arrived.
    #[error("Drawer was not closed within {waited_secs} seconds")]
    Timeout { waited_secs: u64 },

    /// The scale kept failing after bounded retries.
    #[error("Scale failed after {attempts} attempt(s): {message}")]
    SensorFault { attempts: u32, message: String },

    // =========================================================================
    // Credits
    // =========================================================================
    /// Earned credits could not be committed; the deposit is FAILED.
    #[error("Credits could not be recorded: {0}")]
    LedgerWrite(String),

    #[error("Insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits { balance: i64, requested: i64 },

    #[error("Invalid credit amount: {0}")]
    InvalidAmount(i64),

    /// The credit is spent but the drawer stayed locked. Not refunded.
    #[error("Credit spent for request {request_id} but the drawer did not unlock: {message}")]
    UnlockAfterSpend { request_id: String, message: String },

    // =========================================================================
    // Plumbing
    // =========================================================================
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A state machine move the engine should never attempt.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Machine-readable kind for the presentation layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Busy { .. } => ErrorKind::Busy,
            EngineError::HardwareUnavailable(_) => ErrorKind::HardwareUnavailable,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
            EngineError::SensorFault { .. } => ErrorKind::SensorFault,
            EngineError::LedgerWrite(_) => ErrorKind::LedgerWrite,
            EngineError::InsufficientCredits { .. } => ErrorKind::InsufficientCredits,
            EngineError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            EngineError::UnlockAfterSpend { .. } => ErrorKind::UnlockAfterSpend,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Validation(_) | EngineError::Config(_) => ErrorKind::InvalidInput,
            EngineError::InvalidTransition(_) | EngineError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Returns true if starting over (a new deposit, a new redeem) may succeed.
    ///
    /// The engine itself never retries a whole cycle; this is a hint for the UI.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Busy { .. }
                | EngineError::HardwareUnavailable(_)
                | EngineError::Timeout { .. }
                | EngineError::SensorFault { .. }
                | EngineError::LedgerWrite(_)
                | EngineError::Storage(_)
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientCredits { balance, requested } => {
                EngineError::InsufficientCredits { balance, requested }
            }
            CoreError::InvalidAmount(amount) => EngineError::InvalidAmount(amount),
            CoreError::Validation(e) => EngineError::Validation(e),
            e @ CoreError::InvalidTransition { .. } => EngineError::InvalidTransition(e.to_string()),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            e @ DbError::AlreadyEnded { .. } => EngineError::InvalidTransition(e.to_string()),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}
