//! Connection configuration loaded from environment variables

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::sql::Dialect;

/// Connection configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL, e.g. `sqlite::memory:` or `postgres://localhost/app`
    pub database_url: String,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// How long to wait for a pooled connection
    pub acquire_timeout: Duration,

    /// Default deadline applied to contexts created by `Graph::context`
    pub statement_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is required")?;

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .context("Invalid DATABASE_MAX_CONNECTIONS")?;

        let acquire_timeout = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map(Duration::from_secs)
            .context("Invalid DATABASE_ACQUIRE_TIMEOUT_SECS")?;

        let statement_timeout = match env::var("GRAPHSQL_STATEMENT_TIMEOUT_MS") {
            Ok(ms) => Some(
                ms.parse()
                    .map(Duration::from_millis)
                    .context("Invalid GRAPHSQL_STATEMENT_TIMEOUT_MS")?,
            ),
            Err(_) => None,
        };

        let config = Self {
            database_url,
            max_connections,
            acquire_timeout,
            statement_timeout,
        };
        config.dialect()?;
        Ok(config)
    }

    /// Configuration for `url` with default pool settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            database_url: url.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            statement_timeout: None,
        }
    }

    /// Dialect implied by the URL scheme
    pub fn dialect(&self) -> Result<Dialect> {
        Dialect::from_url(&self.database_url)
            .ok_or_else(|| anyhow!("Unsupported database URL scheme: {}", self.database_url))
    }
}
