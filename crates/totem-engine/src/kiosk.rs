//! # Kiosk Facade
//!
//! The operations a presentation layer (touch UI, API, CLI) calls. Identity
//! is trusted: every call carries an `account_id` already authenticated by
//! the session provider.
//!
//! ```text
//! ┌────────────────────────────── Kiosk ───────────────────────────────────┐
//! │                                                                         │
//! │  start_deposit / run_deposit / get_transaction_status ──► DepositEngine │
//! │  redeem                                       ──► RedemptionCoordinator │
//! │  get_balance / get_history                           ──► CreditLedger   │
//! │  drawer_status / recover                             ──► DepositEngine  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::drawer::{Drawer, DrawerTimeouts};
use crate::engine::DepositEngine;
use crate::error::{EngineError, EngineResult};
use crate::hardware::HardwareAdapter;
use crate::redemption::RedemptionCoordinator;
use crate::store::{CreditLedger, DepositStore, RedemptionStore};
use totem_core::validation::validate_account_id;
use totem_core::{
    DepositTransaction, DrawerStatus, LedgerEntry, RedemptionRequest, TransactionStatus,
    WeightPolicy,
};
use totem_db::Database;

/// Default page size for [`Kiosk::get_history`].
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// One kiosk: one drawer, its engine and its ledger.
#[derive(Clone)]
pub struct Kiosk {
    engine: DepositEngine,
    redemption: RedemptionCoordinator,
    ledger: Arc<dyn CreditLedger>,
}

impl Kiosk {
    /// Wires a kiosk to a SQLite database from configuration.
    pub fn new(
        db: Database,
        hardware: Arc<dyn HardwareAdapter>,
        config: &EngineConfig,
    ) -> EngineResult<Self> {
        let store = Arc::new(db);
        Self::with_stores(
            hardware,
            store.clone(),
            store.clone(),
            store,
            config.kiosk.drawer_id.clone(),
            config.policy()?,
            config.drawer_timeouts(),
            config.redemption.cost_credits,
        )
    }

    /// Wires a kiosk to arbitrary stores.
    #[allow(clippy::too_many_arguments)]
    pub fn with_stores(
        hardware: Arc<dyn HardwareAdapter>,
        ledger: Arc<dyn CreditLedger>,
        deposits: Arc<dyn DepositStore>,
        redemptions: Arc<dyn RedemptionStore>,
        drawer_id: String,
        policy: WeightPolicy,
        timeouts: DrawerTimeouts,
        redemption_cost: i64,
    ) -> EngineResult<Self> {
        let drawer = Arc::new(Drawer::new(drawer_id, hardware, timeouts));
        let engine = DepositEngine::new(drawer.clone(), deposits.clone(), policy);
        let redemption =
            RedemptionCoordinator::new(drawer, ledger.clone(), deposits, redemptions, redemption_cost)?;

        Ok(Kiosk {
            engine,
            redemption,
            ledger,
        })
    }

    pub fn engine(&self) -> &DepositEngine {
        &self.engine
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Locks the drawer and returns the new transaction id.
    pub async fn start_deposit(&self, account_id: &str) -> EngineResult<String> {
        self.engine.start_deposit(account_id).await
    }

    /// Runs one deposit to a terminal state.
    pub async fn run_deposit(&self, account_id: &str) -> EngineResult<DepositTransaction> {
        self.engine.run_deposit(account_id).await
    }

    pub async fn get_transaction_status(&self, transaction_id: &str) -> EngineResult<TransactionStatus> {
        self.engine.status(transaction_id).await
    }

    /// Polls a started deposit until it is terminal or `timeout` passes.
    pub async fn await_transaction(
        &self,
        transaction_id: &str,
        timeout: Duration,
    ) -> EngineResult<TransactionStatus> {
        let poll = async {
            loop {
                let status = self.engine.status(transaction_id).await?;
                if status.state.is_terminal() {
                    return Ok(status);
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                waited_secs: timeout.as_secs(),
            }),
        }
    }

    // =========================================================================
    // Credits
    // =========================================================================

    pub async fn get_balance(&self, account_id: &str) -> EngineResult<i64> {
        validate_account_id(account_id)?;
        self.ledger.balance(account_id).await
    }

    /// Ledger entries, most recent first.
    pub async fn get_history(&self, account_id: &str, limit: Option<u32>) -> EngineResult<Vec<LedgerEntry>> {
        validate_account_id(account_id)?;
        self.ledger
            .history(account_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .await
    }

    /// Redeems with a fresh request id.
    ///
    /// Every call is a new redemption, so retrying after an error may spend
    /// again. A caller that retries must use [`Kiosk::redeem_with_id`] with the
    /// id of the first attempt.
    pub async fn redeem(&self, account_id: &str) -> EngineResult<RedemptionRequest> {
        let request_id = Uuid::new_v4().to_string();
        self.redemption.redeem(account_id, &request_id).await
    }

    /// Redeems with a caller-chosen request id, safe to retry.
    ///
    /// A retry with the same id never spends twice, even when the first
    /// attempt failed after its spend was committed.
    pub async fn redeem_with_id(&self, account_id: &str, request_id: &str) -> EngineResult<RedemptionRequest> {
        self.redemption.redeem(account_id, request_id).await
    }

    // =========================================================================
    // Drawer
    // =========================================================================

    pub async fn drawer_status(&self) -> EngineResult<DrawerStatus> {
        self.engine.drawer_status().await
    }

    /// Startup sweep of interrupted deposits.
    pub async fn recover(&self) -> EngineResult<Option<DepositTransaction>> {
        let recovered = self.engine.recover().await?;
        if let Some(tx) = &recovered {
            info!(transaction_id = %tx.id, state = %tx.state, "Recovered interrupted deposit");
        }
        Ok(recovered)
    }
}
