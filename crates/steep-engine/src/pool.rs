//! Connection pool construction.
//!
//! One pool per node connection string, shared across components. Paths
//! that need session-scoped state (advisory locks, replication origins)
//! acquire a dedicated connection and hold it for that state's lifetime.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::Result;

/// Configuration for an engine connection pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Maximum pooled connections (default: 8).
    pub max_connections: u32,
    /// Connection acquire timeout in seconds (default: 30).
    pub acquire_timeout_secs: u64,
    /// Application name reported to the engine.
    pub application_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout_secs: 30,
            application_name: "steep".to_string(),
        }
    }
}

/// A pooled connection to one node's engine.
#[derive(Debug, Clone)]
pub struct EnginePool {
    pool: PgPool,
}

impl EnginePool {
    /// Connects to the engine at `conninfo` with the given pool settings.
    pub async fn connect(conninfo: &str, config: &PoolConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(conninfo)
            .await?;

        tracing::debug!(
            max_connections = config.max_connections,
            "engine pool created"
        );

        Ok(Self { pool })
    }

    /// Connects with default pool settings.
    pub async fn connect_default(conninfo: &str) -> Result<Self> {
        Self::connect(conninfo, &PoolConfig::default()).await
    }

    /// Wraps an existing pool (tests, embeddings).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying sqlx pool.
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}
