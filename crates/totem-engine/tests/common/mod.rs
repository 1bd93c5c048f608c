//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use totem_core::{DepositState, DepositTransaction, LedgerEntry, Weight, WeightPolicy};
use totem_db::{Database, DbConfig};
use totem_engine::{
    DepositStore, DrawerTimeouts, EngineError, EngineResult, Kiosk, SimulatedHardware,
};

/// A valid CPF, used as the account id.
pub const ACCOUNT: &str = "52998224725";

pub fn fast_timeouts() -> DrawerTimeouts {
    DrawerTimeouts {
        close_timeout: Duration::from_millis(150),
        poll_interval: Duration::from_millis(5),
        call_timeout: Duration::from_millis(200),
        max_retries: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

pub struct Harness {
    pub kiosk: Kiosk,
    pub hw: Arc<SimulatedHardware>,
    pub db: Database,
}

pub async fn harness(hw: SimulatedHardware) -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let store = Arc::new(db.clone());
    build(hw, db, store).await
}

/// Kiosk whose deposit store refuses to commit accepted deposits.
pub async fn harness_with_failing_commit(hw: SimulatedHardware) -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let store = Arc::new(FailingCommit(db.clone()));
    build(hw, db, store).await
}

async fn build(hw: SimulatedHardware, db: Database, deposits: Arc<dyn DepositStore>) -> Harness {
    let hw = Arc::new(hw);
    let store = Arc::new(db.clone());
    let kiosk = Kiosk::with_stores(
        hw.clone(),
        store.clone(),
        deposits,
        store,
        "drawer-1".to_string(),
        WeightPolicy::default(),
        fast_timeouts(),
        1,
    )
    .unwrap();

    Harness { kiosk, hw, db }
}

/// Writes a deposit that stopped in `state`, as if the process died there.
pub async fn interrupted_deposit(db: &Database, state: DepositState, kg: Option<f64>) -> DepositTransaction {
    let mut tx = DepositTransaction::new(ACCOUNT, "drawer-1");
    let path = [
        DepositState::AwaitingClose,
        DepositState::Weighing,
        DepositState::Evaluating,
    ];
    for next in path {
        if tx.state == state {
            break;
        }
        tx.transition(next, format!("{}", next)).unwrap();
    }
    if let Some(kg) = kg {
        tx.record_weight(Weight::from_kg(kg).unwrap());
    }

    db.deposits().insert(&tx).await.unwrap();
    tx
}

// =============================================================================
// Failing Store
// =============================================================================

pub struct FailingCommit(pub Database);

#[async_trait]
impl DepositStore for FailingCommit {
    async fn insert(&self, tx: &DepositTransaction) -> EngineResult<()> {
        DepositStore::insert(&self.0, tx).await
    }

    async fn update(&self, tx: &DepositTransaction) -> EngineResult<()> {
        DepositStore::update(&self.0, tx).await
    }

    async fn commit_accepted(
        &self,
        _tx: &DepositTransaction,
        _earn: Option<&LedgerEntry>,
    ) -> EngineResult<Option<LedgerEntry>> {
        Err(EngineError::Storage("disk I/O error".into()))
    }

    async fn get(&self, id: &str) -> EngineResult<Option<DepositTransaction>> {
        DepositStore::get(&self.0, id).await
    }

    async fn find_active(&self, drawer_id: &str) -> EngineResult<Option<DepositTransaction>> {
        DepositStore::find_active(&self.0, drawer_id).await
    }

    async fn list_for_account(
        &self,
        account_id: &str,
        limit: u32,
    ) -> EngineResult<Vec<DepositTransaction>> {
        DepositStore::list_for_account(&self.0, account_id, limit).await
    }
}
