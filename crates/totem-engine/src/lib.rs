//! # totem-engine: Discard & Loyalty Transaction Engine
//!
//! Drives one physical deposit cycle from drawer lock through weighing,
//! acceptance and credit issuance, and redeems credits against a drawer
//! unlock. Keeps the credit ledger consistent when deposits and redemptions
//! race or a cycle is interrupted.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Engine Architecture                            │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Kiosk (facade)                              │  │
//! │  │  start_deposit • get_transaction_status • get_balance            │  │
//! │  │  get_history • redeem • drawer_status • recover                  │  │
//! │  └──────────────┬─────────────────────────────┬─────────────────────┘  │
//! │                 ▼                             ▼                         │
//! │  ┌──────────────────────────┐  ┌──────────────────────────────────┐    │
//! │  │      DepositEngine       │  │      RedemptionCoordinator       │    │
//! │  │                          │  │                                  │    │
//! │  │ LOCKING → AWAITING_CLOSE │  │ spend (atomic) → unlock          │    │
//! │  │ → WEIGHING → EVALUATING  │  │ ErrUnlockAfterSpend, no refund   │    │
//! │  │ → ACCEPTED | REJECTED    │  │                                  │    │
//! │  │ FAILED from any step     │  │                                  │    │
//! │  └─────┬──────────────┬─────┘  └──────┬───────────────────┬───────┘    │
//! │        │              │               │                   │             │
//! │        ▼              ▼               ▼                   ▼             │
//! │  ┌───────────────────────────┐  ┌─────────────────────────────────┐    │
//! │  │  Drawer                   │  │  Store traits                   │    │
//! │  │  timeouts • retries       │  │  CreditLedger • DepositStore    │    │
//! │  │  backoff • per-drawer slot│  │  RedemptionStore                │    │
//! │  │        │                  │  │        │                        │    │
//! │  │        ▼                  │  │        ▼                        │    │
//! │  │  dyn HardwareAdapter      │  │  totem_db::Database (SQLite)    │    │
//! │  └───────────────────────────┘  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`kiosk`] - Facade exposed to the presentation layer
//! - [`engine`] - Deposit state machine
//! - [`redemption`] - Credit spend plus drawer unlock
//! - [`drawer`] - Hardware calls with timeouts, retries and the drawer slot
//! - [`hardware`] - Hardware adapter trait and the simulated adapter
//! - [`store`] - Persistence traits and their SQLite implementations
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use totem_db::{Database, DbConfig};
//! use totem_engine::{EngineConfig, Kiosk, SimulatedHardware};
//!
//! let config = EngineConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//! let kiosk = Kiosk::new(db, Arc::new(SimulatedHardware::new()), &config)?;
//!
//! kiosk.recover().await?;
//! let tx_id = kiosk.start_deposit("account-42").await?;
//! let status = kiosk.get_transaction_status(&tx_id).await?;
//! println!("{}: {}", status.state, status.message);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod drawer;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod kiosk;
pub mod redemption;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::EngineConfig;
pub use drawer::{Drawer, DrawerTimeouts, HwFailure};
pub use engine::DepositEngine;
pub use error::{EngineError, EngineResult};
pub use hardware::{HardwareAdapter, HwError, SimulatedHardware};
pub use kiosk::Kiosk;
pub use redemption::RedemptionCoordinator;
pub use store::{CreditLedger, DepositStore, RedemptionStore};
