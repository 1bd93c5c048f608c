//! # Weight Module
//!
//! Provides the `Weight` type for scale readings.
//!
//! ## Why Integer Grams?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Scale reports kilograms as a float:                                    │
//! │    10.2 / 3.4 = 2.9999999999999996  → floor() = 2  ❌ one credit lost   │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Grams                                            │
//! │    10200 g / 3400 g = 3                              ✓                  │
//! │                                                                         │
//! │  The float is converted exactly once, at the hardware boundary.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use totem_core::weight::Weight;
//!
//! let reading = Weight::from_kg(3.4).unwrap();
//! assert_eq!(reading.grams(), 3_400);
//! assert_eq!(reading.to_string(), "3.40 kg");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use ts_rs::TS;

use crate::error::ValidationError;

const GRAMS_PER_KG: i64 = 1_000;

/// Distance from a whole gram, in grams, still treated as that gram.
const GRAM_SNAP_TOLERANCE: f64 = 1e-6;

// =============================================================================
// Weight Type
// =============================================================================

/// A weight measured in whole grams.
///
/// ## Design Decisions
/// - **i64 grams**: exact integer division for credit calculation
/// - **Truncating conversion**: `from_kg` drops sub-gram noise downwards, so a
///   reading strictly below a threshold can never round up into acceptance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Weight(i64);

impl Weight {
    /// Creates a weight from grams.
    #[inline]
    pub const fn from_grams(grams: i64) -> Self {
        Weight(grams)
    }

    /// Converts a kilogram reading from the scale into whole grams.
    ///
    /// ## Errors
    /// `ValidationError::InvalidFormat` for NaN, infinite or negative readings.
    ///
    /// ## Example
    /// ```rust
    /// use totem_core::weight::Weight;
    ///
    /// assert_eq!(Weight::from_kg(7.0).unwrap().grams(), 7_000);
    /// assert_eq!(Weight::from_kg(64.6).unwrap().grams(), 64_600);
    /// assert_eq!(Weight::from_kg(3.3999).unwrap().grams(), 3_399);
    /// assert!(Weight::from_kg(-1.0).is_err());
    /// ```
    pub fn from_kg(kg: f64) -> Result<Self, ValidationError> {
        if !kg.is_finite() {
            return Err(ValidationError::InvalidFormat {
                field: "weight".to_string(),
                reason: format!("reading {} is not a finite number", kg),
            });
        }

        if kg < 0.0 {
            return Err(ValidationError::InvalidFormat {
                field: "weight".to_string(),
                reason: format!("reading {} kg is negative", kg),
            });
        }

        // Multiplying can land a hair below the intended gram (64.6 * 1000 = 64599.99..)
        let grams = kg * GRAMS_PER_KG as f64;
        let nearest = grams.round();
        let grams = if (grams - nearest).abs() < GRAM_SNAP_TOLERANCE {
            nearest
        } else {
            grams.floor()
        };

        Ok(Weight(grams as i64))
    }

    /// Returns the weight in grams.
    #[inline]
    pub const fn grams(&self) -> i64 {
        self.0
    }

    /// Returns the weight in kilograms (for display only).
    #[inline]
    pub fn kg(&self) -> f64 {
        self.0 as f64 / GRAMS_PER_KG as f64
    }

    /// Zero weight (empty drawer).
    #[inline]
    pub const fn zero() -> Self {
        Weight(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// How many whole `increment`s fit in this weight.
    ///
    /// Returns 0 for a non-positive increment instead of panicking.
    pub const fn whole_multiples_of(&self, increment: Weight) -> i64 {
        if increment.0 <= 0 {
            return 0;
        }
        self.0 / increment.0
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(
            f,
            "{}{}.{:02} kg",
            sign,
            abs / GRAMS_PER_KG,
            (abs % GRAMS_PER_KG) / 10
        )
    }
}

impl Default for Weight {
    fn default() -> Self {
        Weight::zero()
    }
}

impl Add for Weight {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Weight(self.0 + other.0)
    }
}

impl Sub for Weight {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Weight(self.0 - other.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kg_truncates_to_grams() {
        assert_eq!(Weight::from_kg(3.4).unwrap().grams(), 3_400);
        assert_eq!(Weight::from_kg(10.2).unwrap().grams(), 10_200);
        assert_eq!(Weight::from_kg(2.0).unwrap().grams(), 2_000);
        assert_eq!(Weight::from_kg(0.0009).unwrap().grams(), 0);
        assert_eq!(Weight::from_kg(3.3999).unwrap().grams(), 3_399);
    }

    #[test]
    fn test_from_kg_keeps_exact_grams() {
        assert_eq!(Weight::from_kg(2.01).unwrap().grams(), 2_010);
        assert_eq!(Weight::from_kg(64.6).unwrap().grams(), 64_600);
        assert_eq!(Weight::from_kg(129.2).unwrap().grams(), 129_200);
        assert_eq!(Weight::from_kg(258.4).unwrap().grams(), 258_400);
    }

    #[test]
    fn test_from_kg_rejects_bad_readings() {
        assert!(Weight::from_kg(f64::NAN).is_err());
        assert!(Weight::from_kg(f64::INFINITY).is_err());
        assert!(Weight::from_kg(-0.5).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Weight::from_grams(3_400).to_string(), "3.40 kg");
        assert_eq!(Weight::from_grams(7_005).to_string(), "7.00 kg");
        assert_eq!(Weight::from_grams(250).to_string(), "0.25 kg");
        assert_eq!(Weight::zero().to_string(), "0.00 kg");
    }

    #[test]
    fn test_whole_multiples() {
        let increment = Weight::from_grams(3_400);
        assert_eq!(Weight::from_grams(7_000).whole_multiples_of(increment), 2);
        assert_eq!(Weight::from_grams(3_399).whole_multiples_of(increment), 0);
        assert_eq!(Weight::from_grams(5_000).whole_multiples_of(Weight::zero()), 0);
    }

    #[test]
    fn test_arithmetic() {
        let a = Weight::from_grams(3_000);
        let b = Weight::from_grams(400);
        assert_eq!((a + b).grams(), 3_400);
        assert_eq!((a - b).grams(), 2_600);
    }
}
