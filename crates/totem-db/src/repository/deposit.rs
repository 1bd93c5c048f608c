//! # Deposit Repository
//!
//! Persisted log of deposit cycles. Every state change the engine makes is
//! written here before the next hardware step, so a restart always finds the
//! last known state.
//!
//! ## Deposit Lifecycle in Storage
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert()          state = locking     ← partial UNIQUE(drawer_id)      │
//! │     │                                    rejects a 2nd active deposit   │
//! │     ▼                                                                   │
//! │  update()          awaiting_close → weighing → evaluating               │
//! │     │                                                                   │
//! │     ├──► commit_accepted()   ┐ one SQL transaction:                     │
//! │     │                        │  INSERT earn ON CONFLICT DO NOTHING      │
//! │     │                        │  UPDATE state = accepted                 │
//! │     │                        ┘                                          │
//! │     └──► update()    rejected / failed (no ledger write)                │
//! │                                                                         │
//! │  Both writes skip a row that has already ended (a terminal row may only │
//! │  be rewritten with its own state), reporting DbError::AlreadyEnded.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::ledger::{find_on, insert_earn, owned_by_caller};
use totem_core::{DepositState, DepositTransaction, EntryKind, LedgerEntry};

const DEPOSIT_COLUMNS: &str = "id, account_id, drawer_id, state, measured_weight_grams, \
     credits_awarded, error_kind, message, started_at, updated_at, ended_at";

/// Repository for deposit transactions.
#[derive(Debug, Clone)]
pub struct DepositRepository {
    pool: SqlitePool,
}

impl DepositRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DepositRepository { pool }
    }

    /// Inserts a new transaction.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` on `drawer_id` when the drawer already has a
    /// non-terminal transaction.
    pub async fn insert(&self, tx: &DepositTransaction) -> DbResult<()> {
        debug!(transaction_id = %tx.id, drawer_id = %tx.drawer_id, "Inserting deposit");

        sqlx::query(
            r#"
            INSERT INTO deposit_transactions (
                id, account_id, drawer_id, state,
                measured_weight_grams, credits_awarded, error_kind, message,
                started_at, updated_at, ended_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.account_id)
        .bind(&tx.drawer_id)
        .bind(tx.state)
        .bind(tx.measured_weight_grams)
        .bind(tx.credits_awarded)
        .bind(tx.error_kind)
        .bind(&tx.message)
        .bind(tx.started_at)
        .bind(tx.updated_at)
        .bind(tx.ended_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Writes the mutable columns of an existing transaction.
    pub async fn update(&self, tx: &DepositTransaction) -> DbResult<()> {
        debug!(transaction_id = %tx.id, state = %tx.state, "Updating deposit");

        let result = sqlx::query(
            r#"
            UPDATE deposit_transactions SET
                state = ?2,
                measured_weight_grams = ?3,
                credits_awarded = ?4,
                error_kind = ?5,
                message = ?6,
                updated_at = ?7,
                ended_at = ?8
            WHERE id = ?1
              AND (state NOT IN ('accepted', 'rejected', 'failed') OR state = ?2)
            "#,
        )
        .bind(&tx.id)
        .bind(tx.state)
        .bind(tx.measured_weight_grams)
        .bind(tx.credits_awarded)
        .bind(tx.error_kind)
        .bind(&tx.message)
        .bind(tx.updated_at)
        .bind(tx.ended_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let mut conn = self.pool.acquire().await?;
            return Err(refused_write(&mut conn, &tx.id).await);
        }

        Ok(())
    }

    /// Commits an accepted deposit.
    ///
    /// The earn entry (if any) and the `accepted` state land in the same SQL
    /// transaction: either both are visible or neither is. Replaying the call
    /// for the same transaction id does not write a second earn.
    ///
    /// ## Returns
    /// The stored earn entry, or `None` when no credits were awarded.
    pub async fn commit_accepted(
        &self,
        tx: &DepositTransaction,
        earn: Option<&LedgerEntry>,
    ) -> DbResult<Option<LedgerEntry>> {
        let mut db_tx = self.pool.begin().await?;

        let stored = match earn {
            Some(entry) => {
                insert_earn(&mut db_tx, entry).await?;
                find_on(&mut db_tx, EntryKind::Earn, &tx.id)
                    .await?
                    .map(|stored| owned_by_caller(stored, entry))
                    .transpose()?
            }
            None => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE deposit_transactions SET
                state = ?2,
                measured_weight_grams = ?3,
                credits_awarded = ?4,
                error_kind = NULL,
                message = ?5,
                updated_at = ?6,
                ended_at = ?7
            WHERE id = ?1
              AND state NOT IN ('accepted', 'rejected', 'failed')
            "#,
        )
        .bind(&tx.id)
        .bind(tx.state)
        .bind(tx.measured_weight_grams)
        .bind(tx.credits_awarded)
        .bind(&tx.message)
        .bind(tx.updated_at)
        .bind(tx.ended_at)
        .execute(&mut *db_tx)
        .await?;

        if result.rows_affected() == 0 {
            let err = refused_write(&mut db_tx, &tx.id).await;
            let replayed = matches!(
                &err,
                DbError::AlreadyEnded { state, .. } if state == DepositState::Accepted.as_str()
            );
            if replayed {
                // Committed by an earlier evaluation; the earn insert above was a no-op
                debug!(transaction_id = %tx.id, "Accepted deposit replayed");
                return Ok(stored);
            }
            return Err(err);
        }

        db_tx.commit().await?;

        debug!(
            transaction_id = %tx.id,
            credits = tx.credits_awarded.unwrap_or(0),
            "Deposit committed as accepted"
        );
        Ok(stored)
    }

    /// Gets a transaction by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<DepositTransaction>> {
        let sql = format!(
            "SELECT {} FROM deposit_transactions WHERE id = ?1",
            DEPOSIT_COLUMNS
        );

        let tx = sqlx::query_as::<_, DepositTransaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tx)
    }

    /// The drawer's non-terminal transaction, if any.
    pub async fn find_active(&self, drawer_id: &str) -> DbResult<Option<DepositTransaction>> {
        let sql = format!(
            "SELECT {} FROM deposit_transactions \
             WHERE drawer_id = ?1 AND state NOT IN ('accepted', 'rejected', 'failed')",
            DEPOSIT_COLUMNS
        );

        let tx = sqlx::query_as::<_, DepositTransaction>(&sql)
            .bind(drawer_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tx)
    }

    /// Transactions of an account, most recent first.
    pub async fn list_for_account(
        &self,
        account_id: &str,
        limit: u32,
    ) -> DbResult<Vec<DepositTransaction>> {
        let sql = format!(
            "SELECT {} FROM deposit_transactions WHERE account_id = ?1 \
             ORDER BY rowid DESC LIMIT ?2",
            DEPOSIT_COLUMNS
        );

        let txs = sqlx::query_as::<_, DepositTransaction>(&sql)
            .bind(account_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(txs)
    }
}

/// Explains why a guarded write touched no row.
async fn refused_write(conn: &mut SqliteConnection, id: &str) -> DbError {
    let state = sqlx::query_scalar::<_, DepositState>(
        "SELECT state FROM deposit_transactions WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await;

    match state {
        Ok(Some(state)) => DbError::AlreadyEnded {
            id: id.to_string(),
            state: state.as_str().to_string(),
        },
        Ok(None) => DbError::not_found("DepositTransaction", id),
        Err(e) => e.into(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
