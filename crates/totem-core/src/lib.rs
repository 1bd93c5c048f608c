//! # totem-core: Pure Domain Logic for the Totem Kiosk
//!
//! This crate holds every business rule of the oil-collection kiosk as pure
//! functions and plain data. Nothing in here touches the database, the drawer
//! hardware or the clock-driven timeouts; those live in `totem-db` and
//! `totem-engine`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Totem Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Kiosk UI / CLI (presentation)                   │   │
//! │  │   start deposit ──► poll status ──► balance / history / redeem  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          totem-engine (state machine, drawer, redemption)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ totem-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌────────────┐     │   │
//! │  │   │  weight  │  │  policy  │  │  types   │  │ validation │     │   │
//! │  │   │  grams   │  │ evaluate │  │ Deposit  │  │ CPF, ids   │     │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └────────────┘     │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO HARDWARE • PURE FUNCTIONS          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    totem-db (SQLite ledger)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`weight`] - Integer-gram weight type
//! - [`policy`] - Minimum-weight acceptance and credit calculation
//! - [`types`] - Ledger entries, deposit transactions, redemptions, statuses
//! - [`validation`] - Input validation (account ids, CPF, amounts)
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use totem_core::policy::WeightPolicy;
//! use totem_core::weight::Weight;
//!
//! let policy = WeightPolicy::default();
//! let decision = policy.evaluate(Weight::from_grams(7_000));
//!
//! assert!(decision.accepted);
//! assert_eq!(decision.credits_awarded, 2);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod policy;
pub mod types;
pub mod validation;
pub mod weight;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use policy::{PolicyDecision, WeightPolicy};
pub use types::*;
pub use weight::Weight;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Minimum accepted deposit: two 2L PET bottles of used oil.
pub const DEFAULT_MIN_WEIGHT_GRAMS: i64 = 3_400;

/// Credits charged for one 500ml bottle of new oil.
pub const DEFAULT_REDEMPTION_COST: i64 = 1;

/// Drawer identifier used when a kiosk has a single compartment.
pub const DEFAULT_DRAWER_ID: &str = "drawer-1";

/// Rejection reason reported by the weight policy.
pub const REASON_BELOW_MINIMUM: &str = "below minimum weight";
