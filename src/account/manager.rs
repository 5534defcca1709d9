/// Account manager service
///
/// Business rules on top of `AccountStore`: input checks, status
/// transitions, pagination, and the admin audit trail.

use super::{Account, AccountStatus, AccountStore};
use crate::{
    admin::{AdminAction, AuditLogEntry, NewAuditEntry},
    error::{MeterError, MeterResult},
    metrics,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Default and maximum page sizes for listings
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

const MAX_ACCOUNT_ID_LEN: usize = 128;

/// One page of accounts
#[derive(Debug, Clone)]
pub struct AccountPage {
    pub accounts: Vec<Account>,
    /// Id to pass as `cursor` for the next page, if the page was full
    pub cursor: Option<String>,
}

pub struct AccountManager {
    store: Arc<dyn AccountStore>,
}

impl AccountManager {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Register an account in `PENDING` with a zero balance
    pub async fn register(&self, id: &str, email: Option<String>) -> MeterResult<Account> {
        validate_account_id(id)?;
        let email = normalize_email(email)?;

        let now = Utc::now();
        let account = Account {
            id: id.to_string(),
            email,
            status: AccountStatus::Pending,
            status_changed_by: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_with_balance(&account).await?;
        info!(account_id = id, "registered account");

        Ok(account)
    }

    pub async fn get(&self, id: &str) -> MeterResult<Account> {
        self.store
            .fetch(id)
            .await?
            .ok_or_else(|| MeterError::NotFound(format!("Account {} not found", id)))
    }

    pub async fn list(
        &self,
        status: Option<AccountStatus>,
        limit: Option<i64>,
        cursor: Option<&str>,
    ) -> MeterResult<AccountPage> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let accounts = self.store.list(status, limit, cursor).await?;

        let cursor = if accounts.len() as i64 == limit {
            accounts.last().map(|a| a.id.clone())
        } else {
            None
        };

        Ok(AccountPage { accounts, cursor })
    }

    /// Apply an admin status transition
    ///
    /// Re-applying the current status succeeds without writing. A concurrent
    /// change between the read and the conditional update yields `Conflict`.
    pub async fn set_status(
        &self,
        id: &str,
        status: AccountStatus,
        admin_id: &str,
    ) -> MeterResult<Account> {
        let current = self.get(id).await?;

        if current.status == status {
            return Ok(current);
        }

        if !current.status.can_transition_to(status) {
            return Err(MeterError::InvalidArgument(format!(
                "Cannot move account {} from {} to {}",
                id,
                current.status.as_str(),
                status.as_str()
            )));
        }

        let updated = self
            .store
            .update_status(id, current.status, status, admin_id)
            .await?
            .ok_or_else(|| {
                MeterError::Conflict(format!("Account {} changed status concurrently", id))
            })?;

        info!(
            account_id = id,
            admin_id,
            from = current.status.as_str(),
            to = status.as_str(),
            "account status changed"
        );

        Ok(updated)
    }

    /// Record a completed admin action. Failures are logged, not returned,
    /// since the action itself already happened.
    pub async fn log_action(
        &self,
        admin_id: &str,
        action: AdminAction,
        subject_id: Option<&str>,
        details: Option<String>,
    ) -> Option<AuditLogEntry> {
        metrics::ADMIN_ACTIONS_TOTAL
            .with_label_values(&[action.as_str()])
            .inc();

        let entry = NewAuditEntry {
            admin_id: admin_id.to_string(),
            action,
            subject_id: subject_id.map(str::to_string),
            details,
        };

        match self.store.record_audit(entry).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(admin_id, action = action.as_str(), error = %e, "failed to write audit entry");
                None
            }
        }
    }

    pub async fn audit_log(&self, limit: Option<i64>) -> MeterResult<Vec<AuditLogEntry>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        self.store.list_audit(limit).await
    }
}

fn validate_account_id(id: &str) -> MeterResult<()> {
    if id.trim().is_empty() {
        return Err(MeterError::InvalidArgument("Account id cannot be empty".to_string()));
    }
    if id.len() > MAX_ACCOUNT_ID_LEN {
        return Err(MeterError::InvalidArgument(format!(
            "Account id longer than {} characters",
            MAX_ACCOUNT_ID_LEN
        )));
    }
    Ok(())
}

fn normalize_email(email: Option<String>) -> MeterResult<Option<String>> {
    let Some(email) = email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(Some(email)),
        _ => Err(MeterError::InvalidArgument(format!("Invalid email address: {}", email))),
    }
}
