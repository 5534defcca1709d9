/// SQLite account store
use super::{map_insert_error, Account, AccountStatus, AccountStore};
use crate::{
    admin::{AdminAction, AuditLogEntry, NewAuditEntry},
    error::MeterResult,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

const ACCOUNT_COLUMNS: &str = "id, email, status, status_changed_by, created_at, updated_at";

pub struct SqliteAccountStore {
    db: SqlitePool,
}

impl SqliteAccountStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

fn parse_account(row: &SqliteRow) -> MeterResult<Account> {
    let status: String = row.try_get("status")?;
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        status: AccountStatus::from_str(&status)?,
        status_changed_by: row.try_get("status_changed_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_audit(row: &SqliteRow) -> MeterResult<AuditLogEntry> {
    let action: String = row.try_get("action")?;
    Ok(AuditLogEntry {
        id: row.try_get("id")?,
        admin_id: row.try_get("admin_id")?,
        action: AdminAction::from_str(&action)?,
        subject_id: row.try_get("subject_id")?,
        details: row.try_get("details")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn insert_with_balance(&self, account: &Account) -> MeterResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO account (id, email, status, status_changed_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&account.id)
        .bind(&account.email)
        .bind(account.status.as_str())
        .bind(&account.status_changed_by)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, &account.id))?;

        // A grant may already have opened the balance
        sqlx::query(
            r#"
            INSERT INTO credit_balance (account_id, remaining_units, updated_at)
            VALUES (?1, 0, ?2)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(&account.id)
        .bind(account.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fetch(&self, id: &str) -> MeterResult<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {} FROM account WHERE id = ?", ACCOUNT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(parse_account).transpose()
    }

    async fn list(
        &self,
        status: Option<AccountStatus>,
        limit: i64,
        cursor: Option<&str>,
    ) -> MeterResult<Vec<Account>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM account
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR id > ?2)
            ORDER BY id
            LIMIT ?3
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_account).collect()
    }

    async fn update_status(
        &self,
        id: &str,
        from: AccountStatus,
        to: AccountStatus,
        changed_by: &str,
    ) -> MeterResult<Option<Account>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE account
            SET status = ?1, status_changed_by = ?2, updated_at = ?3
            WHERE id = ?4 AND status = ?5
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(to.as_str())
        .bind(changed_by)
        .bind(Utc::now())
        .bind(id)
        .bind(from.as_str())
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(parse_account).transpose()
    }

    async fn record_audit(&self, entry: NewAuditEntry) -> MeterResult<AuditLogEntry> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO admin_audit_log (admin_id, action, subject_id, details, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.admin_id)
        .bind(entry.action.as_str())
        .bind(&entry.subject_id)
        .bind(&entry.details)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(AuditLogEntry {
            id: result.last_insert_rowid(),
            admin_id: entry.admin_id,
            action: entry.action,
            subject_id: entry.subject_id,
            details: entry.details,
            created_at: now,
        })
    }

    async fn list_audit(&self, limit: i64) -> MeterResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, admin_id, action, subject_id, details, created_at
            FROM admin_audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_audit).collect()
    }
}
