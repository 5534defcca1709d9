/// Configuration management for Credit Meter
use crate::error::{MeterError, MeterResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection (and for SQLite write locks)
    pub acquire_timeout: u64,
}

/// Which database holds accounts and balances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageBackend {
    Sqlite { path: PathBuf },
    Postgres { url: String },
}

impl StorageBackend {
    /// Parse a `sqlite://` or `postgres://` database URL
    pub fn from_url(url: &str) -> MeterResult<Self> {
        if let Some(path) = url.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(MeterError::Config("SQLite path cannot be empty".to_string()));
            }
            Ok(StorageBackend::Sqlite { path: PathBuf::from(path) })
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(StorageBackend::Postgres { url: url.to_string() })
        } else {
            Err(MeterError::Config(format!(
                "Unsupported database URL scheme: {}",
                url.split("://").next().unwrap_or(url)
            )))
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider
    pub jwt_secret: String,
    /// Expected `aud` claim, if the provider sets one
    pub jwt_audience: Option<String>,
    /// Account ids allowed to use the admin endpoints (comma-separated)
    pub admin_ids: Vec<String>,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> MeterResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("METER_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("METER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| MeterError::Config("Invalid port number".to_string()))?;
        let version = env!("CARGO_PKG_VERSION").to_string();

        let database_url = env::var("METER_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/credit-meter.sqlite".to_string());
        let backend = StorageBackend::from_url(&database_url)?;
        let max_connections = env::var("METER_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let acquire_timeout = env::var("METER_DB_ACQUIRE_TIMEOUT")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let jwt_secret = env::var("METER_JWT_SECRET")
            .map_err(|_| MeterError::Config("METER_JWT_SECRET required".to_string()))?;
        let jwt_audience = env::var("METER_JWT_AUDIENCE").ok().filter(|s| !s.is_empty());
        let admin_ids = parse_list(&env::var("METER_ADMIN_IDS").unwrap_or_default());

        let rate_limit_enabled = env::var("METER_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let requests_per_second = env::var("METER_RATE_LIMIT_RPS")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);
        let burst_size = env::var("METER_RATE_LIMIT_BURST")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "credit_meter=info,tower_http=info".to_string());
        let json = env::var("METER_LOG_JSON")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                backend,
                max_connections,
                acquire_timeout,
            },
            authentication: AuthConfig {
                jwt_secret,
                jwt_audience,
                admin_ids,
            },
            rate_limit: RateLimitSettings {
                enabled: rate_limit_enabled,
                requests_per_second,
                burst_size,
            },
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> MeterResult<()> {
        if self.service.hostname.is_empty() {
            return Err(MeterError::Config("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(MeterError::Config(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(MeterError::Config(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the account id is a configured administrator
    pub fn is_admin(&self, account_id: &str) -> bool {
        self.authentication.admin_ids.iter().any(|id| id == account_id)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
