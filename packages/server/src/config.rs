use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;

/// Top-level server configuration: the HTTP-serving concerns (bind port,
/// database URL, connection pool size) plus the mining engine's own
/// config, loaded separately by `mining_core::MiningConfig::from_env()`.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub max_db_connections: u32,
    pub mining: Arc<mining_core::MiningConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let mining = mining_core::MiningConfig::from_env().context("invalid mining engine config")?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            max_db_connections: env::var("MAX_DB_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("MAX_DB_CONNECTIONS must be a valid number")?,
            mining: Arc::new(mining),
        })
    }
}
