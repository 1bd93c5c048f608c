//! # Weight Policy
//!
//! Maps a measured deposit weight to an acceptance decision and a credit count.
//!
//! ## Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  weight < min_weight            → REJECTED, "below minimum weight"      │
//! │  weight ≥ min_weight            → ACCEPTED                              │
//! │      credits = ⌊weight / credit_increment⌋                              │
//! │                                                                         │
//! │  Defaults: min_weight = credit_increment = 3.4 kg (two 2L PET bottles) │
//! │                                                                         │
//! │    2.0 kg → rejected      3.4 kg → 1 credit      7.0 kg → 2 credits    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The policy is a value, not a global: operators tune both thresholds from
//! configuration without a code change.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::weight::Weight;
use crate::{DEFAULT_MIN_WEIGHT_GRAMS, REASON_BELOW_MINIMUM};

/// Outcome of evaluating one deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub accepted: bool,
    pub credits_awarded: i64,
    pub reason: String,
}

/// Minimum-weight deposit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightPolicy {
    min_weight: Weight,
    credit_increment: Weight,
}

impl WeightPolicy {
    /// Creates a policy, rejecting non-positive thresholds.
    pub fn new(min_weight: Weight, credit_increment: Weight) -> Result<Self, ValidationError> {
        if !min_weight.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "min_weight".to_string(),
            });
        }
        if !credit_increment.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "credit_increment".to_string(),
            });
        }

        Ok(WeightPolicy {
            min_weight,
            credit_increment,
        })
    }

    pub fn min_weight(&self) -> Weight {
        self.min_weight
    }

    pub fn credit_increment(&self) -> Weight {
        self.credit_increment
    }

    /// Evaluates a measured weight. Deterministic and side-effect free.
    pub fn evaluate(&self, weight: Weight) -> PolicyDecision {
        if weight < self.min_weight {
            return PolicyDecision {
                accepted: false,
                credits_awarded: 0,
                reason: REASON_BELOW_MINIMUM.to_string(),
            };
        }

        let credits = weight.whole_multiples_of(self.credit_increment);
        PolicyDecision {
            accepted: true,
            credits_awarded: credits,
            reason: format!("accepted: {} credit(s) for {}", credits, weight),
        }
    }
}

impl Default for WeightPolicy {
    fn default() -> Self {
        WeightPolicy {
            min_weight: Weight::from_grams(DEFAULT_MIN_WEIGHT_GRAMS),
            credit_increment: Weight::from_grams(DEFAULT_MIN_WEIGHT_GRAMS),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kg(value: f64) -> Weight {
        Weight::from_kg(value).unwrap()
    }

    #[test]
    fn test_outcome_table() {
        let policy = WeightPolicy::default();
        let table = [
            (0.0, false, 0),
            (2.0, false, 0),
            (3.399, false, 0),
            (3.4, true, 1),
            (5.0, true, 1),
            (6.8, true, 2),
            (7.0, true, 2),
            (10.2, true, 3),
            (64.6, true, 19),
            (129.2, true, 38),
        ];

        for (weight, accepted, credits) in table {
            let decision = policy.evaluate(kg(weight));
            assert_eq!(decision.accepted, accepted, "weight {}", weight);
            assert_eq!(decision.credits_awarded, credits, "weight {}", weight);
        }
    }

    #[test]
    fn test_rejection_reason() {
        let decision = WeightPolicy::default().evaluate(kg(2.0));
        assert_eq!(decision.reason, "below minimum weight");
    }

    #[test]
    fn test_tuned_increment() {
        let policy = WeightPolicy::new(Weight::from_grams(3_400), Weight::from_grams(1_000)).unwrap();
        assert_eq!(policy.evaluate(kg(3.4)).credits_awarded, 3);
        assert!(!policy.evaluate(kg(3.0)).accepted);
    }

    #[test]
    fn test_rejects_non_positive_thresholds() {
        assert!(WeightPolicy::new(Weight::zero(), Weight::from_grams(1)).is_err());
        assert!(WeightPolicy::new(Weight::from_grams(1), Weight::from_grams(-5)).is_err());
    }

    proptest! {
        #[test]
        fn below_minimum_is_always_rejected(w in 0.0f64..3.4) {
            let decision = WeightPolicy::default().evaluate(kg(w));
            prop_assert!(!decision.accepted);
            prop_assert_eq!(decision.credits_awarded, 0);
        }

        #[test]
        fn at_or_above_minimum_earns_floor_of_increments(grams in 3_400i64..1_000_000) {
            let decision = WeightPolicy::default().evaluate(Weight::from_grams(grams));
            prop_assert!(decision.accepted);
            prop_assert_eq!(decision.credits_awarded, grams / 3_400);
        }

        #[test]
        fn gram_readings_in_kg_earn_floor_of_increments(grams in 3_400i64..500_000) {
            let reading = grams as f64 / 1_000.0;
            let decision = WeightPolicy::default().evaluate(kg(reading));
            prop_assert!(decision.accepted);
            prop_assert_eq!(decision.credits_awarded, grams / 3_400);
        }

        #[test]
        fn evaluation_is_deterministic(grams in 0i64..100_000) {
            let policy = WeightPolicy::default();
            let weight = Weight::from_grams(grams);
            prop_assert_eq!(policy.evaluate(weight), policy.evaluate(weight));
        }
    }
}
