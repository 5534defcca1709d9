/// SQLite balance store
use super::{CreditBalance, CreditStore};
use crate::error::MeterResult;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

pub struct SqliteCreditStore {
    db: SqlitePool,
}

impl SqliteCreditStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CreditStore for SqliteCreditStore {
    async fn fetch(&self, account_id: &str) -> MeterResult<Option<CreditBalance>> {
        let row = sqlx::query(
            "SELECT account_id, remaining_units, updated_at FROM credit_balance WHERE account_id = ?",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| {
            Ok(CreditBalance {
                account_id: row.try_get("account_id")?,
                remaining_units: row.try_get("remaining_units")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn add(&self, account_id: &str, amount: i64, ceiling: i64) -> MeterResult<Option<i64>> {
        let remaining = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO credit_balance (account_id, remaining_units, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (account_id) DO UPDATE
            SET remaining_units = credit_balance.remaining_units + excluded.remaining_units,
                updated_at = excluded.updated_at
            WHERE credit_balance.remaining_units <= ?4
            RETURNING remaining_units
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .bind(Utc::now())
        .bind(ceiling)
        .fetch_optional(&self.db)
        .await?;

        Ok(remaining)
    }

    async fn decrement_if_positive(&self, account_id: &str) -> MeterResult<Option<i64>> {
        let remaining = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE credit_balance
            SET remaining_units = remaining_units - 1,
                updated_at = ?1
            WHERE account_id = ?2 AND remaining_units > 0
            RETURNING remaining_units
            "#,
        )
        .bind(Utc::now())
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(remaining)
    }

    async fn decrement_if_active(&self, account_id: &str) -> MeterResult<Option<i64>> {
        let remaining = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE credit_balance
            SET remaining_units = remaining_units - 1,
                updated_at = ?1
            WHERE account_id = ?2 AND remaining_units > 0
              AND EXISTS (
                  SELECT 1 FROM account
                  WHERE account.id = credit_balance.account_id AND account.status = 'ACTIVE'
              )
            RETURNING remaining_units
            "#,
        )
        .bind(Utc::now())
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(remaining)
    }

    async fn exists(&self, account_id: &str) -> MeterResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM credit_balance WHERE account_id = ?")
                .bind(account_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::DbPool, test_support::sqlite_pool};

    async fn setup_store() -> (tempfile::TempDir, SqliteCreditStore) {
        let (dir, pool) = sqlite_pool().await;
        let DbPool::Sqlite(pool) = pool else {
            unreachable!("test pool is SQLite")
        };
        (dir, SqliteCreditStore::new(pool))
    }

    #[tokio::test]
    async fn test_decrement_reports_no_match_at_zero() {
        let (_dir, store) = setup_store().await;
        store.add("acct", 1, i64::MAX).await.unwrap();

        assert_eq!(store.decrement_if_positive("acct").await.unwrap(), Some(0));
        assert_eq!(store.decrement_if_positive("acct").await.unwrap(), None);
        assert_eq!(store.fetch("acct").await.unwrap().unwrap().remaining_units, 0);
    }

    #[tokio::test]
    async fn test_add_respects_ceiling() {
        let (_dir, store) = setup_store().await;
        store.add("acct", 10, i64::MAX).await.unwrap();

        assert_eq!(store.add("acct", 5, 9).await.unwrap(), None);
        assert_eq!(store.add("acct", 5, 10).await.unwrap(), Some(15));
    }

    #[tokio::test]
    async fn test_exists_and_fetch_missing() {
        let (_dir, store) = setup_store().await;

        assert!(!store.exists("acct").await.unwrap());
        assert!(store.fetch("acct").await.unwrap().is_none());
        assert_eq!(store.decrement_if_positive("acct").await.unwrap(), None);

        store.add("acct", 0, i64::MAX).await.unwrap();
        assert!(store.exists("acct").await.unwrap());
    }
}
