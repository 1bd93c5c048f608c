//! # Error Types
//!
//! Domain-specific error types for totem-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  totem-core errors (this file)                                         │
//! │  ├── CoreError        - Ledger and state machine rule violations       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  totem-db errors                                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  totem-engine errors                                                   │
//! │  └── EngineError      - What callers of the engine see                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ApiError → UI       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::DepositState;

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Spending more credits than the account holds.
    ///
    /// ## User Workflow
    /// ```text
    /// Redeem (cost: 1)
    ///      │
    ///      ▼
    /// Ledger balance = 0
    ///      │
    ///      ▼
    /// InsufficientCredits { balance: 0, requested: 1 }
    ///      │
    ///      ▼
    /// UI shows: "You need at least 1 credit"
    /// ```
    #[error("Insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits { balance: i64, requested: i64 },

    /// Credit amounts must be strictly positive.
    #[error("Invalid credit amount: {0}")]
    InvalidAmount(i64),

    /// The deposit state machine does not allow this move.
    #[error("Transaction {transaction_id} cannot move from {from} to {to}")]
    InvalidTransition {
        transaction_id: String,
        from: DepositState,
        to: DepositState,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g. malformed CPF, NaN weight reading).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientCredits {
            balance: 0,
            requested: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient credits: balance 0, requested 1"
        );

        let err = CoreError::InvalidTransition {
            transaction_id: "tx-1".to_string(),
            from: DepositState::Accepted,
            to: DepositState::Weighing,
        };
        assert_eq!(
            err.to_string(),
            "Transaction tx-1 cannot move from accepted to weighing"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "account_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
