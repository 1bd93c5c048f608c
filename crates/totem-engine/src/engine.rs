//! # Deposit Engine
//!
//! Drives one physical deposit cycle per drawer, from lock to credit issuance.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  IDLE ──start_deposit──► LOCKING ──lock ok──► AWAITING_CLOSE            │
//! │   ▲      (ErrBusy if a      │                      │                    │
//! │   │       deposit is        │ lock failed          │ closed             │
//! │   │       active)           ▼                      ▼                    │
//! │   │                      FAILED ◄──timeout──── WEIGHING                 │
//! │   │                         ▲                      │                    │
//! │   │                         │ scale / ledger       │ reading ok         │
//! │   │                         │ failure              ▼                    │
//! │   │                         └─────────────────  EVALUATING              │
//! │   │                                             │         │             │
//! │   │                                    accepted │         │ rejected    │
//! │   │                                             ▼         ▼             │
//! │   └──────────── (terminal) ───────────────  ACCEPTED   REJECTED         │
//! │                                                                         │
//! │  Every step is persisted before the next hardware call. The persisted  │
//! │  non-terminal record is what makes the drawer busy.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Unlock Rules
//! - FAILED after the drawer was locked: best-effort unlock.
//! - REJECTED: unlock so the user can take the load back.
//! - ACCEPTED with credits: unlock after the credits are committed.
//!
//! ## Acceptance Commit
//! The EARN entry and the ACCEPTED state are written in one database
//! transaction, tagged with the deposit id. Replaying EVALUATING (after a
//! crash, or via [`DepositEngine::resume`]) never credits twice.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::drawer::Drawer;
use crate::error::{EngineError, EngineResult};
use crate::store::DepositStore;
use totem_core::validation::validate_account_id;
use totem_core::{
    DepositState, DepositTransaction, DrawerStatus, ErrorKind, LedgerEntry, TransactionStatus,
    WeightPolicy,
};

/// State machine for one drawer.
#[derive(Clone)]
pub struct DepositEngine {
    drawer: Arc<Drawer>,
    deposits: Arc<dyn DepositStore>,
    policy: WeightPolicy,
}

impl DepositEngine {
    pub fn new(drawer: Arc<Drawer>, deposits: Arc<dyn DepositStore>, policy: WeightPolicy) -> Self {
        DepositEngine {
            drawer,
            deposits,
            policy,
        }
    }

    pub fn policy(&self) -> &WeightPolicy {
        &self.policy
    }

    pub fn drawer_id(&self) -> &str {
        self.drawer.id()
    }

    // =========================================================================
    // Entry Points
    // =========================================================================

    /// Locks the drawer for `account_id` and returns the transaction id.
    ///
    /// The rest of the cycle runs on its own tokio task; poll
    /// [`status`](Self::status) to follow it.
    pub async fn start_deposit(&self, account_id: &str) -> EngineResult<String> {
        validate_account_id(account_id)?;
        let tx = self.begin(account_id).await?;
        let transaction_id = tx.id.clone();

        let engine = self.clone();
        tokio::spawn(async move {
            let id = tx.id.clone();
            if let Err(e) = engine.finish(tx).await {
                warn!(transaction_id = %id, error = %e, "Deposit cycle ended in failure");
            }
        });

        Ok(transaction_id)
    }

    /// Runs a full cycle and waits for it.
    ///
    /// Returns the ACCEPTED or REJECTED record; every FAILED outcome comes
    /// back as the error that caused it.
    pub async fn run_deposit(&self, account_id: &str) -> EngineResult<DepositTransaction> {
        validate_account_id(account_id)?;
        let tx = self.begin(account_id).await?;
        self.finish(tx).await
    }

    /// Replays EVALUATING for a transaction that stopped there.
    ///
    /// Terminal transactions and ones still in progress are returned as they are.
    /// Racing the cycle that owns the transaction is harmless: the second
    /// commit finds it ACCEPTED and changes nothing, and storage refuses to
    /// overwrite a deposit that already ended.
    pub async fn resume(&self, transaction_id: &str) -> EngineResult<DepositTransaction> {
        let tx = self.load(transaction_id).await?;

        if tx.state == DepositState::Evaluating && tx.measured_weight().is_some() {
            info!(transaction_id = %tx.id, "Replaying evaluation");
            return self.evaluate(tx).await;
        }

        Ok(tx)
    }

    /// Startup sweep. Call before serving users, never while a cycle runs.
    ///
    /// An interrupted EVALUATING deposit with a weight is finished; any other
    /// active deposit becomes FAILED(`Interrupted`) and the drawer is unlocked.
    pub async fn recover(&self) -> EngineResult<Option<DepositTransaction>> {
        let mut tx = match self.deposits.find_active(self.drawer.id()).await? {
            Some(tx) => tx,
            None => return Ok(None),
        };

        warn!(
            transaction_id = %tx.id,
            drawer_id = %tx.drawer_id,
            state = %tx.state,
            "Found interrupted deposit"
        );

        if tx.state == DepositState::Evaluating && tx.measured_weight().is_some() {
            return self.evaluate(tx).await.map(Some);
        }

        self.fail(&mut tx, ErrorKind::Interrupted, "Interrupted by restart")
            .await;
        self.drawer.best_effort_unlock().await;
        Ok(Some(tx))
    }

    pub async fn status(&self, transaction_id: &str) -> EngineResult<TransactionStatus> {
        Ok(self.load(transaction_id).await?.status())
    }

    /// Busy while any deposit on this drawer is non-terminal.
    pub async fn drawer_status(&self) -> EngineResult<DrawerStatus> {
        Ok(match self.deposits.find_active(self.drawer.id()).await? {
            Some(tx) => DrawerStatus::Busy {
                transaction_id: tx.id,
            },
            None => DrawerStatus::Idle,
        })
    }

    // =========================================================================
    // Cycle
    // =========================================================================

    /// IDLE → LOCKING → AWAITING_CLOSE.
    async fn begin(&self, account_id: &str) -> EngineResult<DepositTransaction> {
        let mut tx = {
            let _slot = self.drawer.claim()?;

            if let Some(active) = self.deposits.find_active(self.drawer.id()).await? {
                return Err(EngineError::Busy {
                    drawer_id: self.drawer.id().to_string(),
                    transaction_id: Some(active.id),
                });
            }

            let tx = DepositTransaction::new(account_id, self.drawer.id());
            self.deposits.insert(&tx).await?;
            tx
        };

        info!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            drawer_id = %tx.drawer_id,
            state = %tx.state,
            "Deposit started"
        );

        if let Err(failure) = self.drawer.lock().await {
            self.fail(
                &mut tx,
                ErrorKind::HardwareUnavailable,
                format!("Drawer could not be locked: {}", failure),
            )
            .await;
            return Err(EngineError::HardwareUnavailable(failure.to_string()));
        }

        if let Err(e) = self
            .advance(&mut tx, DepositState::AwaitingClose, "Waiting for the drawer to close")
            .await
        {
            return Err(self.abort(&mut tx, e).await);
        }

        Ok(tx)
    }

    /// AWAITING_CLOSE → WEIGHING → EVALUATING → terminal.
    async fn finish(&self, mut tx: DepositTransaction) -> EngineResult<DepositTransaction> {
        match self.drawer.wait_closed().await {
            Ok(true) => {}
            Ok(false) => {
                let waited_secs = self.drawer.timeouts().close_timeout.as_secs();
                self.fail(
                    &mut tx,
                    ErrorKind::Timeout,
                    format!("Drawer was not closed within {} seconds", waited_secs),
                )
                .await;
                self.drawer.best_effort_unlock().await;
                return Err(EngineError::Timeout { waited_secs });
            }
            Err(failure) => {
                self.fail(
                    &mut tx,
                    ErrorKind::HardwareUnavailable,
                    format!("Drawer-closed signal unavailable: {}", failure),
                )
                .await;
                self.drawer.best_effort_unlock().await;
                return Err(EngineError::HardwareUnavailable(failure.to_string()));
            }
        }

        if let Err(e) = self
            .advance(&mut tx, DepositState::Weighing, "Weighing deposit")
            .await
        {
            return Err(self.abort(&mut tx, e).await);
        }

        let weight = match self.drawer.read_weight().await {
            Ok(weight) => weight,
            Err(failure) => {
                self.fail(
                    &mut tx,
                    ErrorKind::SensorFault,
                    format!("Scale could not be read: {}", failure),
                )
                .await;
                self.drawer.best_effort_unlock().await;
                return Err(EngineError::SensorFault {
                    attempts: failure.attempts,
                    message: failure.error.to_string(),
                });
            }
        };

        tx.record_weight(weight);
        if let Err(e) = self
            .advance(&mut tx, DepositState::Evaluating, format!("Evaluating {}", weight))
            .await
        {
            return Err(self.abort(&mut tx, e).await);
        }

        self.evaluate(tx).await
    }

    /// EVALUATING → ACCEPTED | REJECTED | FAILED(LedgerWrite).
    async fn evaluate(&self, mut tx: DepositTransaction) -> EngineResult<DepositTransaction> {
        let weight = tx.measured_weight().ok_or_else(|| {
            EngineError::InvalidTransition(format!("Transaction {} has no measured weight", tx.id))
        })?;
        let decision = self.policy.evaluate(weight);

        if !decision.accepted {
            if let Err(e) = self
                .advance(&mut tx, DepositState::Rejected, decision.reason)
                .await
            {
                return Err(self.abort(&mut tx, e).await);
            }
            self.release(&mut tx).await;
            return Ok(tx);
        }

        let credits = decision.credits_awarded;
        let mut accepted = tx.clone();
        accepted.credits_awarded = Some(credits);
        accepted.transition(DepositState::Accepted, decision.reason)?;

        let earn = if credits > 0 {
            Some(LedgerEntry::earn(
                &tx.account_id,
                credits,
                &tx.id,
                format!("Deposit of {}", weight),
            )?)
        } else {
            None
        };

        if let Err(e) = self.deposits.commit_accepted(&accepted, earn.as_ref()).await {
            self.fail(
                &mut tx,
                ErrorKind::LedgerWrite,
                format!("Credits could not be recorded: {}", e),
            )
            .await;
            self.drawer.best_effort_unlock().await;
            return Err(EngineError::LedgerWrite(e.to_string()));
        }

        info!(
            transaction_id = %accepted.id,
            account_id = %accepted.account_id,
            credits,
            %weight,
            "Deposit accepted"
        );

        if credits > 0 {
            self.release(&mut accepted).await;
        }
        Ok(accepted)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load(&self, transaction_id: &str) -> EngineResult<DepositTransaction> {
        self.deposits
            .get(transaction_id)
            .await?
            .ok_or_else(|| EngineError::not_found("DepositTransaction", transaction_id))
    }

    async fn advance(
        &self,
        tx: &mut DepositTransaction,
        next: DepositState,
        message: impl Into<String>,
    ) -> EngineResult<()> {
        tx.transition(next, message)?;
        self.deposits.update(tx).await?;
        info!(transaction_id = %tx.id, state = %tx.state, message = %tx.message, "Deposit state changed");
        Ok(())
    }

    /// Moves to FAILED and persists it. A persistence failure is logged;
    /// [`recover`](Self::recover) clears the stale record on next start.
    async fn fail(&self, tx: &mut DepositTransaction, kind: ErrorKind, message: impl Into<String>) {
        if let Err(e) = tx.fail(kind, message) {
            error!(transaction_id = %tx.id, error = %e, "Cannot mark deposit failed");
            return;
        }

        error!(
            transaction_id = %tx.id,
            error_kind = %kind,
            message = %tx.message,
            "Deposit failed"
        );

        if let Err(e) = self.deposits.update(tx).await {
            error!(transaction_id = %tx.id, error = %e, "Could not persist FAILED state");
        }
    }

    /// Fails the deposit with the error's kind and frees the drawer.
    async fn abort(&self, tx: &mut DepositTransaction, err: EngineError) -> EngineError {
        if !tx.is_terminal() {
            self.fail(tx, err.kind(), err.to_string()).await;
        }
        self.drawer.best_effort_unlock().await;
        err
    }

    /// Unlock after a decision. The outcome stands even if the drawer sticks.
    async fn release(&self, tx: &mut DepositTransaction) {
        if let Err(failure) = self.drawer.unlock().await {
            warn!(transaction_id = %tx.id, error = %failure, "Drawer did not unlock after decision");
            tx.message = format!("{} (drawer did not unlock: {})", tx.message, failure);
            tx.updated_at = Utc::now();
            if let Err(e) = self.deposits.update(tx).await {
                warn!(transaction_id = %tx.id, error = %e, "Could not record unlock failure");
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawer::DrawerTimeouts;
    use crate::hardware::SimulatedHardware;
    use std::time::Duration;
    use totem_core::Weight;
    use totem_db::{Database, DbConfig};

    async fn setup(hw: SimulatedHardware) -> (DepositEngine, Arc<SimulatedHardware>, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let hw = Arc::new(hw);
        let timeouts = DrawerTimeouts {
            close_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
            call_timeout: Duration::from_millis(100),
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };
        let drawer = Arc::new(Drawer::new("drawer-1", hw.clone(), timeouts));
        let engine = DepositEngine::new(drawer, Arc::new(db.clone()), WeightPolicy::default());
        (engine, hw, db)
    }

    #[tokio::test]
    async fn test_run_deposit_accepts_and_unlocks() {
        let (engine, hw, _db) = setup(SimulatedHardware::new().with_weights([3.4])).await;

        let tx = engine.run_deposit("acc-1").await.unwrap();
        assert_eq!(tx.state, DepositState::Accepted);
        assert_eq!(tx.credits_awarded, Some(1));
        assert!(!hw.is_locked());
        assert!(engine.drawer_status().await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_empty_account_is_rejected_before_hardware() {
        let (engine, hw, _db) = setup(SimulatedHardware::new()).await;

        let err = engine.start_deposit("  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(hw.lock_calls(), 0);
    }

    #[tokio::test]
    async fn test_lock_failure_is_terminal() {
        let (engine, hw, db) = setup(SimulatedHardware::new()).await;
        hw.fail_lock(crate::hardware::HwError::Unavailable("offline".into()));

        let err = engine.run_deposit("acc-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HardwareUnavailable);

        let history = db.deposits().list_for_account("acc-1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, DepositState::Failed);
        assert_eq!(history[0].error_kind, Some(ErrorKind::HardwareUnavailable));
        assert!(engine.drawer_status().await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_resume_returns_terminal_unchanged() {
        let (engine, hw, _db) = setup(SimulatedHardware::new().with_weights([2.0])).await;

        let tx = engine.run_deposit("acc-1").await.unwrap();
        assert_eq!(tx.state, DepositState::Rejected);
        assert_eq!(hw.unlock_calls(), 1);

        let again = engine.resume(&tx.id).await.unwrap();
        assert_eq!(again.state, DepositState::Rejected);
        assert_eq!(again.message, "below minimum weight");
        assert_eq!(hw.unlock_calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_evaluation_cannot_undo_acceptance() {
        let (engine, _hw, db) = setup(SimulatedHardware::new()).await;
        let mut tx = DepositTransaction::new("acc-1", "drawer-1");
        tx.transition(DepositState::AwaitingClose, "close").unwrap();
        tx.transition(DepositState::Weighing, "weigh").unwrap();
        tx.record_weight(Weight::from_grams(7_000));
        tx.transition(DepositState::Evaluating, "evaluate").unwrap();
        db.deposits().insert(&tx).await.unwrap();

        let accepted = engine.resume(&tx.id).await.unwrap();
        assert_eq!(accepted.state, DepositState::Accepted);

        // A second evaluation of the same snapshot commits nothing new
        let again = engine.evaluate(tx.clone()).await.unwrap();
        assert_eq!(again.state, DepositState::Accepted);

        // Nor can a late failure overwrite the outcome
        let mut stale = tx.clone();
        engine
            .fail(&mut stale, ErrorKind::LedgerWrite, "lost the race")
            .await;

        let persisted = db.deposits().get(&tx.id).await.unwrap().unwrap();
        assert_eq!(persisted.state, DepositState::Accepted);
        assert_eq!(persisted.error_kind, None);
        assert_eq!(db.ledger().balance("acc-1").await.unwrap(), 2);
        assert_eq!(db.ledger().count_for_account("acc-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_status_of_unknown_transaction() {
        let (engine, _hw, _db) = setup(SimulatedHardware::new()).await;
        let err = engine.status("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
