//! # totem-db: Persistence Layer for the Totem Kiosk
//!
//! SQLite storage for the credit ledger, the deposit transaction log and the
//! redemption records, using sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Totem Data Flow                                  │
//! │                                                                         │
//! │  totem-engine (DepositEngine, RedemptionCoordinator)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     totem-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ LedgerRepo     │   │ 001_initial  │  │   │
//! │  │   │ SqlitePool    │◄───│ DepositRepo    │   │ _schema.sql  │  │   │
//! │  │   │ WAL, FKs      │    │ RedemptionRepo │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/totem/totem.db                                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage-Level Guarantees
//!
//! - Balance is `SUM(credit_delta)`, computed on demand, never cached
//! - `UNIQUE (kind, transaction_id)` makes earn/spend replays no-ops
//! - Spends are a single conditional `INSERT … SELECT`, so two concurrent
//!   spends can never overdraw an account
//! - A partial UNIQUE index allows one non-terminal deposit per drawer, so the
//!   busy invariant survives restarts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use totem_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./totem.db")).await?;
//! let balance = db.ledger().balance("acc-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::deposit::DepositRepository;
pub use repository::ledger::{LedgerRepository, SpendOutcome};
pub use repository::redemption::RedemptionRepository;
