//! # Domain Types
//!
//! Core domain types used throughout the kiosk.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────────┐  ┌──────────────────┐  │
//! │  │   LedgerEntry    │  │  DepositTransaction  │  │RedemptionRequest │  │
//! │  │  ──────────────  │  │  ──────────────────  │  │  ──────────────  │  │
//! │  │  id (UUID)       │  │  id (UUID)           │  │  id (request id) │  │
//! │  │  account_id      │  │  account_id          │  │  account_id      │  │
//! │  │  kind Earn|Spend │  │  drawer_id           │  │  credits_spent   │  │
//! │  │  credit_delta    │  │  state               │  │  ledger_entry_id │  │
//! │  │  transaction_id  │  │  measured_weight     │  │  unlocked_at     │  │
//! │  └──────────────────┘  └──────────────────────┘  └──────────────────┘  │
//! │                                                                         │
//! │  Account balance is NEVER stored: balance = Σ credit_delta             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Deposit State Machine
//! ```text
//!   LOCKING ──► AWAITING_CLOSE ──► WEIGHING ──► EVALUATING ──┬─► ACCEPTED
//!      │              │               │             │        └─► REJECTED
//!      └──────────────┴───────────────┴─────────────┴──────────► FAILED
//! ```
//! The drawer is IDLE whenever none of its transactions is non-terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::weight::Weight;

// =============================================================================
// Error Kind
// =============================================================================

/// Machine-readable failure taxonomy shared by the engine, storage and UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Drawer already has an active deposit.
    Busy,
    /// Lock/unlock actuator did not respond.
    HardwareUnavailable,
    /// Drawer was not closed in time.
    Timeout,
    /// Scale kept failing after bounded retries.
    SensorFault,
    /// Earned credits could not be committed.
    LedgerWrite,
    InsufficientCredits,
    InvalidAmount,
    /// Credit spent but the drawer stayed locked.
    UnlockAfterSpend,
    /// Transaction was left mid-cycle by a restart.
    Interrupted,
    NotFound,
    InvalidInput,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Busy => "busy",
            ErrorKind::HardwareUnavailable => "hardware_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::SensorFault => "sensor_fault",
            ErrorKind::LedgerWrite => "ledger_write",
            ErrorKind::InsufficientCredits => "insufficient_credits",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::UnlockAfterSpend => "unlock_after_spend",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Credits earned by an accepted deposit.
    Earn,
    /// Credits spent on a redemption.
    Spend,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Earn => "earn",
            EntryKind::Spend => "spend",
        }
    }
}

/// An immutable ledger record.
///
/// ## Invariants
/// - Earn entries have a positive `credit_delta`, spend entries a negative one
/// - At most one entry per `(kind, transaction_id)` (idempotent replays)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub account_id: String,
    pub kind: EntryKind,
    pub credit_delta: i64,
    /// Deposit transaction id (earn) or redemption request id (spend).
    pub transaction_id: String,
    /// Human-readable line shown in the loyalty history.
    pub description: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Builds an earn entry. Fails with `InvalidAmount` for non-positive credits.
    pub fn earn(
        account_id: &str,
        credits: i64,
        transaction_id: &str,
        description: impl Into<String>,
    ) -> CoreResult<Self> {
        if credits <= 0 {
            return Err(CoreError::InvalidAmount(credits));
        }

        Ok(LedgerEntry {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            kind: EntryKind::Earn,
            credit_delta: credits,
            transaction_id: transaction_id.to_string(),
            description: description.into(),
            created_at: Utc::now(),
        })
    }

    /// Builds a spend entry. The stored delta is negative.
    pub fn spend(
        account_id: &str,
        credits: i64,
        request_id: &str,
        description: impl Into<String>,
    ) -> CoreResult<Self> {
        if credits <= 0 {
            return Err(CoreError::InvalidAmount(credits));
        }

        Ok(LedgerEntry {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            kind: EntryKind::Spend,
            credit_delta: -credits,
            transaction_id: request_id.to_string(),
            description: description.into(),
            created_at: Utc::now(),
        })
    }
}

/// Sums committed entry deltas.
pub fn balance_of<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> i64 {
    entries.into_iter().map(|e| e.credit_delta).sum()
}

// =============================================================================
// Deposit State
// =============================================================================

/// State of one physical deposit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositState {
    Locking,
    AwaitingClose,
    Weighing,
    Evaluating,
    Accepted,
    Rejected,
    Failed,
}

impl DepositState {
    /// Terminal states never change again and never block the drawer.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            DepositState::Accepted | DepositState::Rejected | DepositState::Failed
        )
    }

    /// Returns true if the state machine allows `self → next`.
    pub fn can_transition_to(&self, next: DepositState) -> bool {
        use DepositState::*;

        if self.is_terminal() {
            return false;
        }

        matches!(
            (self, next),
            (Locking, AwaitingClose)
                | (AwaitingClose, Weighing)
                | (Weighing, Evaluating)
                | (Evaluating, Accepted)
                | (Evaluating, Rejected)
                | (_, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepositState::Locking => "locking",
            DepositState::AwaitingClose => "awaiting_close",
            DepositState::Weighing => "weighing",
            DepositState::Evaluating => "evaluating",
            DepositState::Accepted => "accepted",
            DepositState::Rejected => "rejected",
            DepositState::Failed => "failed",
        }
    }
}

impl fmt::Display for DepositState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Deposit Transaction
// =============================================================================

/// One physical deposit cycle, mutated only by the deposit engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DepositTransaction {
    pub id: String,
    pub account_id: String,
    pub drawer_id: String,
    pub state: DepositState,
    /// Scale reading in grams, once weighed.
    pub measured_weight_grams: Option<i64>,
    /// Credits granted, once accepted.
    pub credits_awarded: Option<i64>,
    /// Failure kind, once failed.
    pub error_kind: Option<ErrorKind>,
    /// Human-readable description of the current state.
    pub message: String,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl DepositTransaction {
    /// Creates a fresh transaction in `LOCKING`.
    pub fn new(account_id: &str, drawer_id: &str) -> Self {
        let now = Utc::now();
        DepositTransaction {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            drawer_id: drawer_id.to_string(),
            state: DepositState::Locking,
            measured_weight_grams: None,
            credits_awarded: None,
            error_kind: None,
            message: "Locking drawer".to_string(),
            started_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the measured weight as a `Weight`.
    pub fn measured_weight(&self) -> Option<Weight> {
        self.measured_weight_grams.map(Weight::from_grams)
    }

    /// Moves to `next`, enforcing the state machine.
    pub fn transition(&mut self, next: DepositState, message: impl Into<String>) -> CoreResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                transaction_id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }

        let now = Utc::now();
        self.state = next;
        self.message = message.into();
        self.updated_at = now;
        if next.is_terminal() {
            self.ended_at = Some(now);
        }
        Ok(())
    }

    /// Moves to `FAILED`, recording the failure kind.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> CoreResult<()> {
        self.transition(DepositState::Failed, message)?;
        self.error_kind = Some(kind);
        Ok(())
    }

    /// Records the scale reading (WEIGHING step).
    pub fn record_weight(&mut self, weight: Weight) {
        self.measured_weight_grams = Some(weight.grams());
        self.updated_at = Utc::now();
    }

    /// Snapshot for status queries.
    pub fn status(&self) -> TransactionStatus {
        TransactionStatus {
            transaction_id: self.id.clone(),
            account_id: self.account_id.clone(),
            state: self.state,
            weight_kg: self.measured_weight().map(|w| w.kg()),
            credits_awarded: self.credits_awarded,
            error_kind: self.error_kind,
            message: self.message.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// What `getTransactionStatus` returns to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    pub transaction_id: String,
    pub account_id: String,
    pub state: DepositState,
    pub weight_kg: Option<f64>,
    pub credits_awarded: Option<i64>,
    pub error_kind: Option<ErrorKind>,
    pub message: String,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub ended_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Drawer Status
// =============================================================================

/// Whether the drawer can take a new deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrawerStatus {
    Idle,
    Busy { transaction_id: String },
}

impl DrawerStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, DrawerStatus::Idle)
    }
}

// =============================================================================
// Redemption
// =============================================================================

/// A committed credit spend plus the drawer unlock it paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRequest {
    pub id: String,
    pub account_id: String,
    pub credits_spent: i64,
    pub ledger_entry_id: String,
    /// `None` until the drawer actually unlocked.
    #[ts(as = "Option<String>")]
    pub unlocked_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl RedemptionRequest {
    /// Builds the record for a spend that has just been committed.
    pub fn for_spend(request_id: &str, entry: &LedgerEntry) -> Self {
        RedemptionRequest {
            id: request_id.to_string(),
            account_id: entry.account_id.clone(),
            credits_spent: -entry.credit_delta,
            ledger_entry_id: entry.id.clone(),
            unlocked_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }
}

// =============================================================================
// Account
// =============================================================================

/// Kiosk user, owned by the external registration/profile subsystem.
///
/// The engine only ever reads `id`; the balance is always derived from the
/// ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    /// CPF, digits only.
    pub national_id: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub address: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================
