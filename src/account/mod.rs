/// Account registry
///
/// Accounts are keyed by the identity provider's opaque id and move through
/// an admin-controlled lifecycle. Registering an account also opens its
/// zero credit balance.

pub mod manager;
pub mod postgres;
pub mod sqlite;

pub use manager::AccountManager;

use crate::{
    admin::{AuditLogEntry, NewAuditEntry},
    db::DbPool,
    error::{MeterError, MeterResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    /// Registered, waiting for an admin
    Pending,
    /// Approved; usage is metered
    Active,
    /// Suspended by an admin
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "PENDING",
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Blocked => "BLOCKED",
        }
    }

    pub fn from_str(s: &str) -> MeterResult<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(AccountStatus::Pending),
            "ACTIVE" => Ok(AccountStatus::Active),
            "BLOCKED" => Ok(AccountStatus::Blocked),
            _ => Err(MeterError::InvalidArgument(format!("Invalid account status: {}", s))),
        }
    }

    /// Admins may approve or block from any state, but never reset to pending
    pub fn can_transition_to(&self, next: AccountStatus) -> bool {
        match next {
            AccountStatus::Pending => *self == AccountStatus::Pending,
            AccountStatus::Active | AccountStatus::Blocked => true,
        }
    }
}

/// Account record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email: Option<String>,
    pub status: AccountStatus,
    /// Admin who made the last status change
    pub status_changed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage backend for accounts and the admin audit trail
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert the account and open its zero balance in one transaction.
    /// Fails with `Conflict` if the id is taken.
    async fn insert_with_balance(&self, account: &Account) -> MeterResult<()>;

    async fn fetch(&self, id: &str) -> MeterResult<Option<Account>>;

    /// Accounts ordered by id, starting after `cursor`
    async fn list(
        &self,
        status: Option<AccountStatus>,
        limit: i64,
        cursor: Option<&str>,
    ) -> MeterResult<Vec<Account>>;

    /// Compare-and-set the status. Returns `None` if the row no longer has
    /// status `from`.
    async fn update_status(
        &self,
        id: &str,
        from: AccountStatus,
        to: AccountStatus,
        changed_by: &str,
    ) -> MeterResult<Option<Account>>;

    async fn record_audit(&self, entry: NewAuditEntry) -> MeterResult<AuditLogEntry>;

    /// Newest entries first
    async fn list_audit(&self, limit: i64) -> MeterResult<Vec<AuditLogEntry>>;
}

/// Build the store matching the pool's backend
pub fn store_for(pool: &DbPool) -> Arc<dyn AccountStore> {
    match pool {
        DbPool::Sqlite(pool) => Arc::new(sqlite::SqliteAccountStore::new(pool.clone())),
        DbPool::Postgres(pool) => Arc::new(postgres::PostgresAccountStore::new(pool.clone())),
    }
}

/// Map a unique-key violation to `Conflict`, anything else to `Storage`
pub(crate) fn map_insert_error(err: sqlx::Error, id: &str) -> MeterError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            MeterError::Conflict(format!("Account {} already registered", id))
        }
        _ => MeterError::Storage(err),
    }
}
