/// PostgreSQL balance store
///
/// The conditional UPDATE takes a row lock on the target balance only, so
/// ticks against different accounts proceed in parallel.
use super::{CreditBalance, CreditStore};
use crate::error::MeterResult;
use async_trait::async_trait;
use sqlx::{postgres::PgPool, Row};

pub struct PostgresCreditStore {
    db: PgPool,
}

impl PostgresCreditStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CreditStore for PostgresCreditStore {
    async fn fetch(&self, account_id: &str) -> MeterResult<Option<CreditBalance>> {
        let row = sqlx::query(
            "SELECT account_id, remaining_units, updated_at FROM credit_balance WHERE account_id = $1",
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
            VALUES ($1, $2, NOW())
            ON CONFLICT (account_id) DO UPDATE
            SET remaining_units = credit_balance.remaining_units + EXCLUDED.remaining_units,
                updated_at = EXCLUDED.updated_at
            WHERE credit_balance.remaining_units <= $3
            RETURNING remaining_units
            "#,
        )
        .bind(account_id)
        .bind(amount)
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
                updated_at = NOW()
            WHERE account_id = $1 AND remaining_units > 0
            RETURNING remaining_units
            "#,
        )
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
                updated_at = NOW()
            WHERE account_id = $1 AND remaining_units > 0
              AND EXISTS (
                  SELECT 1 FROM account
                  WHERE account.id = credit_balance.account_id AND account.status = 'ACTIVE'
              )
            RETURNING remaining_units
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(remaining)
    }

    async fn exists(&self, account_id: &str) -> MeterResult<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM credit_balance WHERE account_id = $1)",
        )
        .bind(account_id)
        .fetch_one(&self.db)
        .await?;

        Ok(found)
    }
}
