//! # Redemption Repository
//!
//! One row per committed credit spend. `unlocked_at` stays NULL until the
//! drawer actually opened, so a row with a NULL `unlocked_at` is a paid-for
//! bottle the customer has not received yet.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use totem_core::RedemptionRequest;

const REDEMPTION_COLUMNS: &str =
    "id, account_id, credits_spent, ledger_entry_id, unlocked_at, created_at";

/// Repository for redemption requests.
#[derive(Debug, Clone)]
pub struct RedemptionRepository {
    pool: SqlitePool,
}

impl RedemptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RedemptionRepository { pool }
    }

    /// Inserts a request. A repeated id is a `UniqueViolation`.
    pub async fn insert(&self, request: &RedemptionRequest) -> DbResult<()> {
        debug!(request_id = %request.id, account_id = %request.account_id, "Recording redemption");

        sqlx::query(
            r#"
            INSERT INTO redemption_requests (
                id, account_id, credits_spent, ledger_entry_id, unlocked_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&request.id)
        .bind(&request.account_id)
        .bind(request.credits_spent)
        .bind(&request.ledger_entry_id)
        .bind(request.unlocked_at)
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<RedemptionRequest>> {
        let sql = format!(
            "SELECT {} FROM redemption_requests WHERE id = ?1",
            REDEMPTION_COLUMNS
        );

        let request = sqlx::query_as::<_, RedemptionRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(request)
    }

    /// Records that the drawer opened for this request.
    pub async fn mark_unlocked(&self, id: &str, at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE redemption_requests SET unlocked_at = ?2, unlock_error = NULL WHERE id = ?1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("RedemptionRequest", id));
        }

        Ok(())
    }

    /// Keeps the last unlock failure next to the request for manual recovery.
    pub async fn record_unlock_failure(&self, id: &str, error: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE redemption_requests SET unlock_error = ?2 WHERE id = ?1")
                .bind(id)
                .bind(error)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("RedemptionRequest", id));
        }

        Ok(())
    }

    /// Requests whose credit is spent but whose drawer never opened.
    pub async fn list_pending_unlock(&self) -> DbResult<Vec<RedemptionRequest>> {
        let sql = format!(
            "SELECT {} FROM redemption_requests WHERE unlocked_at IS NULL ORDER BY rowid",
            REDEMPTION_COLUMNS
        );

        let requests = sqlx::query_as::<_, RedemptionRequest>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(requests)
    }

    /// Requests of an account, most recent first.
    pub async fn list_for_account(
        &self,
        account_id: &str,
        limit: u32,
    ) -> DbResult<Vec<RedemptionRequest>> {
        let sql = format!(
            "SELECT {} FROM redemption_requests WHERE account_id = ?1 \
             ORDER BY rowid DESC LIMIT ?2",
            REDEMPTION_COLUMNS
        );

        let requests = sqlx::query_as::<_, RedemptionRequest>(&sql)
            .bind(account_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(requests)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::ledger::SpendOutcome;
    use totem_core::LedgerEntry;

    async fn spent_request(db: &Database, request_id: &str) -> RedemptionRequest {
        let earn = LedgerEntry::earn("acc-1", 1, &format!("tx-{request_id}"), "deposit").unwrap();
        db.ledger().earn(&earn).await.unwrap();

        let spend = LedgerEntry::spend("acc-1", 1, request_id, "redeem").unwrap();
        let SpendOutcome::Spent(entry) = db.ledger().spend(&spend).await.unwrap() else {
            panic!("spend must succeed");
        };
        RedemptionRequest::for_spend(request_id, &entry)
    }

    #[tokio::test]
    async fn test_insert_get_and_unlock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let request = spent_request(&db, "req-1").await;
        db.redemptions().insert(&request).await.unwrap();

        let pending = db.redemptions().list_pending_unlock().await.unwrap();
        assert_eq!(pending.len(), 1);

        db.redemptions().mark_unlocked("req-1", Utc::now()).await.unwrap();
        let stored = db.redemptions().get("req-1").await.unwrap().unwrap();
        assert!(stored.is_unlocked());
        assert_eq!(stored.credits_spent, 1);
        assert!(db.redemptions().list_pending_unlock().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_request_id_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let request = spent_request(&db, "req-1").await;
        db.redemptions().insert(&request).await.unwrap();

        let err = db.redemptions().insert(&request).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.redemptions().get("nope").await.unwrap().is_none());
        assert!(db.redemptions().mark_unlocked("nope", Utc::now()).await.is_err());
        assert!(db
            .redemptions()
            .record_unlock_failure("nope", "timeout")
            .await
            .is_err());
    }
}
