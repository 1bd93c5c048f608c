//! # Repository Module
//!
//! Database repository implementations for the kiosk.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  totem-engine store traits                                              │
//! │       │                                                                 │
//! │       │  db.ledger().spend(&entry)                                      │
//! │       ▼                                                                 │
//! │  LedgerRepository / DepositRepository / RedemptionRepository            │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`LedgerRepository`](ledger::LedgerRepository) - Append-only credit ledger
//! - [`DepositRepository`](deposit::DepositRepository) - Deposit transaction log
//! - [`RedemptionRepository`](redemption::RedemptionRepository) - Redemption records

pub mod deposit;
pub mod ledger;
pub mod redemption;

/// Column list shared by every `SELECT` over `ledger_entries`.
pub(crate) const LEDGER_COLUMNS: &str =
    "id, account_id, kind, credit_delta, transaction_id, description, created_at";
