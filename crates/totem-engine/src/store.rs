//! # Store Traits
//!
//! The persistence boundary as the engine sees it. Production wires every
//! trait to [`totem_db::Database`]; tests can wrap or replace any of them to
//! inject storage failures.
//!
//! ```text
//! ┌───────────────────┐   ┌───────────────────┐   ┌───────────────────┐
//! │   CreditLedger    │   │   DepositStore    │   │  RedemptionStore  │
//! │ balance / history │   │ insert / update   │   │ insert / get      │
//! │ earn / spend      │   │ commit_accepted   │   │ mark_unlocked     │
//! └─────────┬─────────┘   └─────────┬─────────┘   └─────────┬─────────┘
//!           └───────────────────────┼───────────────────────┘
//!                                   ▼
//!                        impl … for totem_db::Database
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use totem_core::{DepositTransaction, LedgerEntry, RedemptionRequest, ValidationError};
use totem_db::{Database, DbError, SpendOutcome};

// =============================================================================
// Traits
// =============================================================================

/// Append-only credit ledger.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Sum of every committed delta.
    async fn balance(&self, account_id: &str) -> EngineResult<i64>;

    /// Idempotent by `transaction_id`. `InvalidAmount` if `amount <= 0`; an id
    /// already recorded for another account is a `Validation` error.
    async fn earn(
        &self,
        account_id: &str,
        amount: i64,
        transaction_id: &str,
        description: &str,
    ) -> EngineResult<LedgerEntry>;

    /// Atomic check-then-append. `InsufficientCredits` leaves the ledger unchanged.
    /// Replaying a `request_id` returns the original entry, but only to the
    /// account that made it.
    async fn spend(
        &self,
        account_id: &str,
        amount: i64,
        request_id: &str,
        description: &str,
    ) -> EngineResult<LedgerEntry>;

    /// Most recent first.
    async fn history(&self, account_id: &str, limit: u32) -> EngineResult<Vec<LedgerEntry>>;
}

/// Deposit transaction log.
#[async_trait]
pub trait DepositStore: Send + Sync {
    /// `Busy` when the drawer already has a non-terminal transaction.
    async fn insert(&self, tx: &DepositTransaction) -> EngineResult<()>;

    async fn update(&self, tx: &DepositTransaction) -> EngineResult<()>;

    /// Earn entry and ACCEPTED state in one atomic write.
    async fn commit_accepted(
        &self,
        tx: &DepositTransaction,
        earn: Option<&LedgerEntry>,
    ) -> EngineResult<Option<LedgerEntry>>;

    async fn get(&self, id: &str) -> EngineResult<Option<DepositTransaction>>;

    async fn find_active(&self, drawer_id: &str) -> EngineResult<Option<DepositTransaction>>;

    async fn list_for_account(
        &self,
        account_id: &str,
        limit: u32,
    ) -> EngineResult<Vec<DepositTransaction>>;
}

/// Redemption records.
#[async_trait]
pub trait RedemptionStore: Send + Sync {
    async fn insert(&self, request: &RedemptionRequest) -> EngineResult<()>;

    async fn get(&self, id: &str) -> EngineResult<Option<RedemptionRequest>>;

    async fn mark_unlocked(&self, id: &str, at: DateTime<Utc>) -> EngineResult<()>;

    async fn record_unlock_failure(&self, id: &str, error: &str) -> EngineResult<()>;
}

// =============================================================================
// SQLite Implementations
// =============================================================================

#[async_trait]
impl CreditLedger for Database {
    async fn balance(&self, account_id: &str) -> EngineResult<i64> {
        Ok(self.ledger().balance(account_id).await?)
    }

    async fn earn(
        &self,
        account_id: &str,
        amount: i64,
        transaction_id: &str,
        description: &str,
    ) -> EngineResult<LedgerEntry> {
        let entry = LedgerEntry::earn(account_id, amount, transaction_id, description)?;
        self.ledger()
            .earn(&entry)
            .await
            .map_err(|e| foreign_id(e, "transaction_id"))
    }

    async fn spend(
        &self,
        account_id: &str,
        amount: i64,
        request_id: &str,
        description: &str,
    ) -> EngineResult<LedgerEntry> {
        let entry = LedgerEntry::spend(account_id, amount, request_id, description)?;
        let outcome = self
            .ledger()
            .spend(&entry)
            .await
            .map_err(|e| foreign_id(e, "request_id"))?;
        match outcome {
            SpendOutcome::Spent(stored) => Ok(stored),
            SpendOutcome::Insufficient { balance } => Err(EngineError::InsufficientCredits {
                balance,
                requested: amount,
            }),
        }
    }

    async fn history(&self, account_id: &str, limit: u32) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self.ledger().history(account_id, limit).await?)
    }
}

/// An id already recorded under another account is bad caller input.
fn foreign_id(err: DbError, field: &str) -> EngineError {
    if err.is_unique_violation_on("transaction_id") {
        return ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "already used by another account".to_string(),
        }
        .into();
    }
    err.into()
}

#[async_trait]
impl DepositStore for Database {
    async fn insert(&self, tx: &DepositTransaction) -> EngineResult<()> {
        match self.deposits().insert(tx).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unique_violation_on("drawer_id") => Err(EngineError::Busy {
                drawer_id: tx.drawer_id.clone(),
                transaction_id: None,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, tx: &DepositTransaction) -> EngineResult<()> {
        Ok(self.deposits().update(tx).await?)
    }

    async fn commit_accepted(
        &self,
        tx: &DepositTransaction,
        earn: Option<&LedgerEntry>,
    ) -> EngineResult<Option<LedgerEntry>> {
        Ok(self.deposits().commit_accepted(tx, earn).await?)
    }

    async fn get(&self, id: &str) -> EngineResult<Option<DepositTransaction>> {
        Ok(self.deposits().get(id).await?)
    }

    async fn find_active(&self, drawer_id: &str) -> EngineResult<Option<DepositTransaction>> {
        Ok(self.deposits().find_active(drawer_id).await?)
    }

    async fn list_for_account(
        &self,
        account_id: &str,
        limit: u32,
    ) -> EngineResult<Vec<DepositTransaction>> {
        Ok(self.deposits().list_for_account(account_id, limit).await?)
    }
}

#[async_trait]
impl RedemptionStore for Database {
    async fn insert(&self, request: &RedemptionRequest) -> EngineResult<()> {
        Ok(self.redemptions().insert(request).await?)
    }

    async fn get(&self, id: &str) -> EngineResult<Option<RedemptionRequest>> {
        Ok(self.redemptions().get(id).await?)
    }

    async fn mark_unlocked(&self, id: &str, at: DateTime<Utc>) -> EngineResult<()> {
        Ok(self.redemptions().mark_unlocked(id, at).await?)
    }

    async fn record_unlock_failure(&self, id: &str, error: &str) -> EngineResult<()> {
        Ok(self.redemptions().record_unlock_failure(id, error).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use totem_core::ErrorKind;
    use totem_db::DbConfig;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_earn_rejects_non_positive_amount() {
        let db = setup().await;
        let err = CreditLedger::earn(&db, "acc-1", 0, "tx-1", "deposit")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(0)));
    }

    #[tokio::test]
    async fn test_spend_maps_insufficient_credits() {
        let db = setup().await;
        let err = CreditLedger::spend(&db, "acc-1", 1, "req-1", "redeem")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientCredits {
                balance: 0,
                requested: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_earn_twice_counts_once() {
        let db = setup().await;
        CreditLedger::earn(&db, "acc-1", 3, "tx-1", "deposit").await.unwrap();
        CreditLedger::earn(&db, "acc-1", 3, "tx-1", "deposit").await.unwrap();
        assert_eq!(CreditLedger::balance(&db, "acc-1").await.unwrap(), 3);
        assert_eq!(CreditLedger::history(&db, "acc-1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_request_id_of_another_account_is_invalid_input() {
        let db = setup().await;
        CreditLedger::earn(&db, "acc-a", 1, "tx-a", "deposit").await.unwrap();
        CreditLedger::earn(&db, "acc-b", 1, "tx-b", "deposit").await.unwrap();
        CreditLedger::spend(&db, "acc-a", 1, "req-1", "redeem").await.unwrap();

        let err = CreditLedger::spend(&db, "acc-b", 1, "req-1", "redeem")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(CreditLedger::balance(&db, "acc-b").await.unwrap(), 1);

        let err = CreditLedger::earn(&db, "acc-b", 1, "tx-a", "deposit")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(CreditLedger::balance(&db, "acc-b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_active_deposit_is_busy() {
        let db = setup().await;
        DepositStore::insert(&db, &DepositTransaction::new("acc-1", "drawer-1"))
            .await
            .unwrap();

        let err = DepositStore::insert(&db, &DepositTransaction::new("acc-2", "drawer-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Busy { .. }));
    }
}
