//! # Validation Module
//!
//! Input validation for everything that crosses into the engine.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Kiosk UI                                                     │
//! │  ├── CPF mask "000.000.000-00", 4-digit PIN                            │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine entry points                                          │
//! │  └── THIS MODULE: ids, CPF check digits, credit amounts                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── CHECK (credit_delta <> 0)                                         │
//! │  └── UNIQUE (kind, transaction_id), one active deposit per drawer      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_ID_LEN: usize = 64;
const CPF_LEN: usize = 11;

// =============================================================================
// Identifier Validators
// =============================================================================

fn validate_id(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    Ok(())
}

/// Validates the account reference handed over by the session provider.
///
/// ## Example
/// ```rust
/// use totem_core::validation::validate_account_id;
///
/// assert!(validate_account_id("acc-42").is_ok());
/// assert!(validate_account_id("   ").is_err());
/// ```
pub fn validate_account_id(account_id: &str) -> ValidationResult<()> {
    validate_id("account_id", account_id)
}

/// Validates a caller-supplied redemption request id.
pub fn validate_request_id(request_id: &str) -> ValidationResult<()> {
    validate_id("request_id", request_id)
}

// =============================================================================
// National ID (CPF)
// =============================================================================

/// Normalises and validates a CPF.
///
/// ## Rules
/// - Every non-digit is stripped (`"529.982.247-25"` → `"52998224725"`)
/// - Exactly 11 digits remain
/// - Not all digits identical (`"111.111.111-11"` passes the checksum but is void)
/// - Both check digits match
///
/// ## Returns
/// The digits-only CPF.
///
/// ## Example
/// ```rust
/// use totem_core::validation::validate_national_id;
///
/// assert_eq!(validate_national_id("529.982.247-25").unwrap(), "52998224725");
/// assert!(validate_national_id("529.982.247-24").is_err());
/// ```
pub fn validate_national_id(raw: &str) -> ValidationResult<String> {
    let digits: Vec<u32> = raw.chars().filter_map(|c| c.to_digit(10)).collect();

    if digits.is_empty() {
        return Err(ValidationError::Required {
            field: "national_id".to_string(),
        });
    }

    if digits.len() != CPF_LEN {
        return Err(ValidationError::InvalidFormat {
            field: "national_id".to_string(),
            reason: format!("expected {} digits, got {}", CPF_LEN, digits.len()),
        });
    }

    if digits.iter().all(|d| *d == digits[0]) {
        return Err(ValidationError::InvalidFormat {
            field: "national_id".to_string(),
            reason: "all digits are identical".to_string(),
        });
    }

    if cpf_check_digit(&digits[..9]) != digits[9] || cpf_check_digit(&digits[..10]) != digits[10] {
        return Err(ValidationError::InvalidFormat {
            field: "national_id".to_string(),
            reason: "check digits do not match".to_string(),
        });
    }

    Ok(digits.iter().map(|d| char::from(b'0' + *d as u8)).collect())
}

/// Mod-11 check digit over the given prefix (weights count down to 2).
fn cpf_check_digit(prefix: &[u32]) -> u32 {
    let top = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(i, d)| d * (top - i as u32))
        .sum();

    match (sum * 10) % 11 {
        10 => 0,
        r => r,
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Credit amounts must be strictly positive.
pub fn validate_credit_amount(amount: i64) -> ValidationResult<()> {
    if amount <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
