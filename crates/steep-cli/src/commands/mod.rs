//! CLI command implementations.

pub mod init;
pub mod schema;
pub mod snapshot;

use std::sync::Arc;

use anyhow::Result;
use steep_config::SteepConfig;
use steep_engine::{EnginePool, PoolConfig};
use steep_init::{InitManager, ManagerConfig};
use steep_types::{NodeId, TracingSink};

/// Shared per-invocation context: config, pool, manager.
pub struct App {
    pub config: SteepConfig,
    pub manager: InitManager,
}

/// Connects to the local engine and builds the manager.
pub async fn build(config: SteepConfig) -> Result<App> {
    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        acquire_timeout_secs: config.database.acquire_timeout_secs,
        application_name: "steep".to_string(),
    };
    let engine = EnginePool::connect(&config.database.conninfo, &pool_config).await?;

    let manager = InitManager::new(
        engine.inner().clone(),
        ManagerConfig {
            local_node: NodeId::new(config.node.id.clone()),
            local_conninfo: config.node.endpoint.clone(),
            snapshot_root: config.snapshot.root_dir.clone(),
        },
        Arc::new(TracingSink),
    )
    .await?;

    Ok(App { config, manager })
}
