/// Credit Ledger
///
/// Tracks the remaining usage units (seconds) of every account. The only
/// mutations are an additive grant and a decrement-if-positive tick, both
/// executed by the store as a single conditional statement so concurrent
/// calls on one account never lose an update or drive a balance negative.

pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresCreditStore;
pub use sqlite::SqliteCreditStore;

use crate::{
    db::DbPool,
    error::{MeterError, MeterResult},
    metrics,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Balance record for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub account_id: String,
    pub remaining_units: i64,
    pub updated_at: DateTime<Utc>,
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickOutcome {
    /// True when the balance was already zero and nothing was consumed
    pub exhausted: bool,
    /// Balance after the tick
    pub remaining: i64,
}

/// Storage backend for balances
///
/// Every method maps to one statement. Implementations must not split a
/// mutation into a read followed by a write.
#[async_trait]
pub trait CreditStore: Send + Sync {
    /// Fetch the balance record, if any
    async fn fetch(&self, account_id: &str) -> MeterResult<Option<CreditBalance>>;

    /// Create the record with `amount` or add `amount` to it, unless the sum
    /// would exceed `ceiling`. Returns the new balance, or `None` when the
    /// ceiling check rejected the update.
    async fn add(&self, account_id: &str, amount: i64, ceiling: i64) -> MeterResult<Option<i64>>;

    /// Subtract one unit if the balance is positive. Returns the new
    /// balance, or `None` when no row matched (missing or already zero).
    async fn decrement_if_positive(&self, account_id: &str) -> MeterResult<Option<i64>>;

    /// Like `decrement_if_positive`, but only while the owning account is
    /// `ACTIVE`. The status is checked inside the same statement.
    async fn decrement_if_active(&self, account_id: &str) -> MeterResult<Option<i64>>;

    /// Whether a balance record exists
    async fn exists(&self, account_id: &str) -> MeterResult<bool>;
}

/// Build the store matching the pool's backend
pub fn store_for(pool: &DbPool) -> Arc<dyn CreditStore> {
    match pool {
        DbPool::Sqlite(pool) => Arc::new(SqliteCreditStore::new(pool.clone())),
        DbPool::Postgres(pool) => Arc::new(PostgresCreditStore::new(pool.clone())),
    }
}

/// Largest balance a grant may produce
pub const MAX_BALANCE: i64 = i64::MAX;

/// Ledger service used by the API layer
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn CreditStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn CreditStore>) -> Self {
        Self { store }
    }

    /// Current remaining units
    pub async fn get_balance(&self, account_id: &str) -> MeterResult<i64> {
        let balance = self
            .store
            .fetch(account_id)
            .await
            .map_err(|e| record_failure("get_balance", e))?
            .ok_or_else(|| not_found(account_id))?;

        metrics::LEDGER_OPERATIONS_TOTAL
            .with_label_values(&["get_balance", "ok"])
            .inc();

        Ok(balance.remaining_units)
    }

    /// Add `amount` units, creating the balance if needed. Not idempotent.
    pub async fn grant(&self, account_id: &str, amount: i64) -> MeterResult<i64> {
        if amount < 0 {
            metrics::LEDGER_OPERATIONS_TOTAL
                .with_label_values(&["grant", "rejected"])
                .inc();
            return Err(MeterError::InvalidArgument(format!(
                "Grant amount must be non-negative, got {}",
                amount
            )));
        }

        let remaining = self
            .store
            .add(account_id, amount, MAX_BALANCE - amount)
            .await
            .map_err(|e| record_failure("grant", e))?
            .ok_or_else(|| {
                metrics::LEDGER_OPERATIONS_TOTAL
                    .with_label_values(&["grant", "rejected"])
                    .inc();
                MeterError::InvalidArgument(format!(
                    "Granting {} units to {} would overflow the balance",
                    amount, account_id
                ))
            })?;

        debug!(account_id, amount, remaining, "granted credits");
        metrics::LEDGER_OPERATIONS_TOTAL
            .with_label_values(&["grant", "ok"])
            .inc();
        metrics::LEDGER_UNITS_GRANTED_TOTAL.inc_by(amount as u64);

        Ok(remaining)
    }

    /// Consume one unit if any remain
    pub async fn tick(&self, account_id: &str) -> MeterResult<TickOutcome> {
        let decremented = self
            .store
            .decrement_if_positive(account_id)
            .await
            .map_err(|e| record_failure("tick", e))?;

        let outcome = match decremented {
            None => {
                // Rows are never deleted, so a present row here held zero units
                if !self
                    .store
                    .exists(account_id)
                    .await
                    .map_err(|e| record_failure("tick", e))?
                {
                    return Err(not_found(account_id));
                }
                TickOutcome { exhausted: true, remaining: 0 }
            }
            Some(remaining) => self.consumed(account_id, remaining)?,
        };

        Ok(self.record_tick(account_id, outcome))
    }

    /// Consume one unit from an account that is `ACTIVE` when the decrement
    /// runs. A block committed before the statement stops the tick even if
    /// the caller checked the status earlier.
    pub async fn tick_active(&self, account_id: &str) -> MeterResult<TickOutcome> {
        let decremented = self
            .store
            .decrement_if_active(account_id)
            .await
            .map_err(|e| record_failure("tick", e))?;

        let outcome = match decremented {
            None => {
                let balance = self
                    .store
                    .fetch(account_id)
                    .await
                    .map_err(|e| record_failure("tick", e))?
                    .ok_or_else(|| not_found(account_id))?;

                // Units left but nothing consumed: the status gate refused
                if balance.remaining_units > 0 {
                    metrics::LEDGER_OPERATIONS_TOTAL
                        .with_label_values(&["tick", "rejected"])
                        .inc();
                    return Err(MeterError::Authorization(format!(
                        "Account {} is not active, usage is not allowed",
                        account_id
                    )));
                }
                TickOutcome { exhausted: true, remaining: 0 }
            }
            Some(remaining) => self.consumed(account_id, remaining)?,
        };

        Ok(self.record_tick(account_id, outcome))
    }

    fn consumed(&self, account_id: &str, remaining: i64) -> MeterResult<TickOutcome> {
        if remaining < 0 {
            return Err(record_failure(
                "tick",
                MeterError::StorageInconsistency(format!(
                    "balance of {} went negative",
                    account_id
                )),
            ));
        }

        metrics::LEDGER_UNITS_CONSUMED_TOTAL.inc();
        Ok(TickOutcome { exhausted: false, remaining })
    }

    fn record_tick(&self, account_id: &str, outcome: TickOutcome) -> TickOutcome {
        debug!(account_id, exhausted = outcome.exhausted, remaining = outcome.remaining, "tick");
        metrics::LEDGER_OPERATIONS_TOTAL
            .with_label_values(&["tick", if outcome.exhausted { "exhausted" } else { "ok" }])
            .inc();
        outcome
    }
}

fn not_found(account_id: &str) -> MeterError {
    MeterError::NotFound(format!("No credit balance for account {}", account_id))
}

fn record_failure(operation: &str, err: MeterError) -> MeterError {
    metrics::LEDGER_OPERATIONS_TOTAL
        .with_label_values(&[operation, "error"])
        .inc();
    err
}
