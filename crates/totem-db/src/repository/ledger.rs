//! # Ledger Repository
//!
//! Append-only credit ledger. Rows are never updated or deleted.
//!
//! ## Spend: Compare-and-Write in One Statement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  INSERT INTO ledger_entries (…)                                         │
//! │  SELECT …                                                               │
//! │  WHERE (SELECT SUM(credit_delta) … account) >= amount   ← check         │
//! │  ON CONFLICT (kind, transaction_id) DO NOTHING          ← idempotency   │
//! │                                                                         │
//! │  rows_affected = 1 → Spent(entry)                                       │
//! │  rows_affected = 0 → same request id already stored? → Spent(original) │
//! │                      (stored under another account → UniqueViolation)  │
//! │                      otherwise                       → Insufficient     │
//! │                                                                         │
//! │  SQLite takes the write lock before evaluating the statement, so two   │
//! │  racing spends of the last credit see each other: exactly one wins.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::repository::LEDGER_COLUMNS;
use totem_core::{EntryKind, LedgerEntry};

/// Result of a conditional spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendOutcome {
    /// The spend is committed (or was already committed for this request id).
    Spent(LedgerEntry),
    /// The balance did not cover the amount; nothing was written.
    Insufficient { balance: i64 },
}

/// Repository for ledger operations.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Current balance: the sum of every committed delta for the account.
    pub async fn balance(&self, account_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        balance_on(&mut conn, account_id).await
    }

    /// Appends an earn entry unless one already exists for its transaction id.
    ///
    /// ## Returns
    /// The stored entry: the new one, or the original on replay.
    pub async fn earn(&self, entry: &LedgerEntry) -> DbResult<LedgerEntry> {
        if entry.kind != EntryKind::Earn {
            return Err(DbError::Internal(format!(
                "earn called with a {} entry",
                entry.kind.as_str()
            )));
        }

        let mut conn = self.pool.acquire().await?;
        insert_earn(&mut conn, entry).await?;

        let stored = find_on(&mut conn, EntryKind::Earn, &entry.transaction_id)
            .await?
            .ok_or_else(|| DbError::not_found("LedgerEntry", &entry.transaction_id))?;
        owned_by_caller(stored, entry)
    }

    /// Appends a spend entry if, and only if, the balance covers it.
    pub async fn spend(&self, entry: &LedgerEntry) -> DbResult<SpendOutcome> {
        if entry.kind != EntryKind::Spend {
            return Err(DbError::Internal(format!(
                "spend called with a {} entry",
                entry.kind.as_str()
            )));
        }

        let amount = -entry.credit_delta;
        debug!(
            account_id = %entry.account_id,
            request_id = %entry.transaction_id,
            amount,
            "Conditional spend"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, account_id, kind, credit_delta, transaction_id, description, created_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
            WHERE (
                SELECT COALESCE(SUM(credit_delta), 0)
                FROM ledger_entries
                WHERE account_id = ?2
            ) >= ?8
            ON CONFLICT (kind, transaction_id) DO NOTHING
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.account_id)
        .bind(entry.kind)
        .bind(entry.credit_delta)
        .bind(&entry.transaction_id)
        .bind(&entry.description)
        .bind(entry.created_at)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let stored = find_on(&mut conn, EntryKind::Spend, &entry.transaction_id).await?;

        match stored {
            Some(stored) => {
                let stored = owned_by_caller(stored, entry)?;
                if result.rows_affected() == 0 {
                    debug!(request_id = %entry.transaction_id, "Spend replayed");
                }
                Ok(SpendOutcome::Spent(stored))
            }
            None => {
                let balance = balance_on(&mut conn, &entry.account_id).await?;
                Ok(SpendOutcome::Insufficient { balance })
            }
        }
    }

    /// Entries for an account, most recent first.
    pub async fn history(&self, account_id: &str, limit: u32) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE account_id = ?1 ORDER BY rowid DESC LIMIT ?2",
            LEDGER_COLUMNS
        );

        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(account_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Looks up the entry written for a deposit (earn) or request (spend).
    pub async fn find_by_transaction(
        &self,
        kind: EntryKind,
        transaction_id: &str,
    ) -> DbResult<Option<LedgerEntry>> {
        let mut conn = self.pool.acquire().await?;
        find_on(&mut conn, kind, transaction_id).await
    }

    /// Number of entries for an account.
    pub async fn count_for_account(&self, account_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries WHERE account_id = ?1")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Connection-Level Helpers (shared with DepositRepository::commit_accepted)
// =============================================================================

pub(crate) async fn balance_on(conn: &mut SqliteConnection, account_id: &str) -> DbResult<i64> {
    let balance: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(credit_delta), 0) FROM ledger_entries WHERE account_id = ?1",
    )
    .bind(account_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(balance)
}

/// `INSERT … ON CONFLICT DO NOTHING`; replays leave the original row.
pub(crate) async fn insert_earn(conn: &mut SqliteConnection, entry: &LedgerEntry) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            id, account_id, kind, credit_delta, transaction_id, description, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (kind, transaction_id) DO NOTHING
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.account_id)
    .bind(entry.kind)
    .bind(entry.credit_delta)
    .bind(&entry.transaction_id)
    .bind(&entry.description)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    let inserted = result.rows_affected() == 1;
    if !inserted {
        debug!(transaction_id = %entry.transaction_id, "Earn already recorded");
    }
    Ok(inserted)
}

/// A replayed id must come from the account that first used it.
///
/// ## Errors
/// `DbError::UniqueViolation` on `ledger_entries.transaction_id` when the stored
/// entry belongs to another account. Nothing is written for the caller.
pub(crate) fn owned_by_caller(stored: LedgerEntry, entry: &LedgerEntry) -> DbResult<LedgerEntry> {
    if stored.account_id != entry.account_id {
        warn!(
            transaction_id = %entry.transaction_id,
            account_id = %entry.account_id,
            "Ledger id already used by another account"
        );
        return Err(DbError::duplicate(
            "ledger_entries.transaction_id",
            &entry.transaction_id,
        ));
    }
    Ok(stored)
}

pub(crate) async fn find_on(
    conn: &mut SqliteConnection,
    kind: EntryKind,
    transaction_id: &str,
) -> DbResult<Option<LedgerEntry>> {
    let sql = format!(
        "SELECT {} FROM ledger_entries WHERE kind = ?1 AND transaction_id = ?2",
        LEDGER_COLUMNS
    );

    let entry = sqlx::query_as::<_, LedgerEntry>(&sql)
        .bind(kind)
        .bind(transaction_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(entry)
}

// =============================================================================
// Unit Tests
// =============================================================================
