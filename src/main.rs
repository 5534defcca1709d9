/// Credit Meter
///
/// HTTP backend for account approval and metered usage. Accounts come
/// from an external identity provider; each one carries a balance of usage
/// seconds that admins grant and metered sessions tick down.

mod account;
mod admin;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod ledger;
mod metrics;
mod rate_limit;
mod server;
#[cfg(test)]
mod test_support;

use config::{LoggingConfig, ServerConfig};
use context::AppContext;
use error::MeterResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> MeterResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    init_logging(&config.logging);

    tracing::info!("Credit Meter v{} starting", config.service.version);

    // Create application context (connects and migrates storage)
    let ctx = AppContext::new(config).await?;

    // Serve until SIGINT/SIGTERM, then close the pool
    server::serve(ctx).await?;

    tracing::info!("Credit Meter stopped");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level)
        .unwrap_or_else(|_| EnvFilter::new("credit_meter=info,tower_http=info"));

    if logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
