/// Application context and dependency injection
use crate::{
    account::{self, AccountManager},
    config::ServerConfig,
    db::DbPool,
    error::MeterResult,
    ledger::{self, CreditLedger},
    rate_limit::RateLimiter,
};
use std::sync::Arc;
use tracing::info;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: DbPool,
    pub ledger: Arc<CreditLedger>,
    pub account_manager: Arc<AccountManager>,
    pub rate_limiter: RateLimiter,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> MeterResult<Self> {
        config.validate()?;

        let db = DbPool::connect(&config.storage).await?;
        info!("Storage ready ({})", db.backend_name());

        Ok(Self::with_pool(config, db))
    }

    /// Wire services around an already migrated pool
    pub fn with_pool(config: ServerConfig, db: DbPool) -> Self {
        let ledger = Arc::new(CreditLedger::new(ledger::store_for(&db)));
        let account_manager = Arc::new(AccountManager::new(account::store_for(&db)));
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Self {
            config: Arc::new(config),
            db,
            ledger,
            account_manager,
            rate_limiter,
        }
    }

    /// Release the storage pool. Call once the server has drained.
    pub async fn shutdown(&self) {
        self.db.close().await;
    }

    /// Bind address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.config.service.hostname, self.config.service.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;

    #[tokio::test]
    async fn test_new_connects_and_shutdown_closes_pool() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().join("nested").join("meter.sqlite"));

        let ctx = AppContext::new(config).await.unwrap();
        assert_eq!(ctx.db.backend_name(), "sqlite");
        assert_eq!(ctx.listen_addr(), "127.0.0.1:0");

        ctx.ledger.grant("acct", 3).await.unwrap();
        assert_eq!(ctx.ledger.get_balance("acct").await.unwrap(), 3);

        ctx.shutdown().await;
        assert!(ctx.ledger.get_balance("acct").await.is_err());
    }
}
