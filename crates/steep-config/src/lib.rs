//! Configuration management for Steep
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the caller)
//! 2. Environment variables (STEEP_* prefix)
//! 3. steep.toml (project config)
//! 4. ~/.config/steep/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use steep_types::{CompressionKind, InitOptions, LargeTableMethod, SchemaSyncMode};

mod loader;

pub use loader::ConfigLoader;

/// Main Steep configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SteepConfig {
    pub node: NodeConfig,
    pub database: DatabaseConfig,
    pub init: InitConfig,
    pub snapshot: SnapshotConfig,
}

/// Identity of the node this daemon manages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node id, unique in the topology.
    pub id: String,
    /// Human-readable name.
    pub name: Option<String>,
    /// Connection string peers use to reach this node.
    pub endpoint: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: "steep-node".to_string(),
            name: None,
            endpoint: "host=localhost port=5432 dbname=app".to_string(),
        }
    }
}

/// Local engine connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string the daemon itself uses.
    pub conninfo: String,
    /// Pool size.
    pub max_connections: u32,
    /// Pool acquire timeout in seconds.
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            conninfo: "host=localhost port=5432 dbname=app".to_string(),
            max_connections: 8,
            acquire_timeout_secs: 30,
        }
    }
}

/// Defaults for initialization operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    /// Parallel workers for initial copy and snapshot export.
    pub parallel_workers: u16,
    /// Schema difference handling.
    pub schema_sync: SchemaSyncMode,
    /// Size above which a table is considered large, in bytes.
    pub large_table_threshold: Option<u64>,
    /// Per-table quiesce acquisition timeout for merges, in milliseconds.
    pub quiesce_timeout_ms: u64,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            schema_sync: SchemaSyncMode::Strict,
            large_table_threshold: None,
            quiesce_timeout_ms: 30_000,
        }
    }
}

/// Snapshot storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Root directory snapshot exports land in.
    pub root_dir: PathBuf,
    /// Compression for table files.
    pub compression: CompressionKind,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(".steep/snapshots"),
            compression: CompressionKind::Gzip,
        }
    }
}

impl SteepConfig {
    /// Builds per-operation init options from the configured defaults.
    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            parallel_workers: self.init.parallel_workers,
            schema_sync: self.init.schema_sync,
            large_table_threshold: self.init.large_table_threshold,
            large_table_method: LargeTableMethod::Copy,
            snapshot_compression: self.snapshot.compression,
            quiesce_timeout_ms: self.init.quiesce_timeout_ms,
            ..InitOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = SteepConfig::default();
        assert_eq!(config.init.parallel_workers, 4);
        assert_eq!(config.init.schema_sync, SchemaSyncMode::Strict);
        assert_eq!(config.snapshot.compression, CompressionKind::Gzip);
        config.init_options().validate().unwrap();
    }

    #[test]
    fn toml_roundtrip() {
        let config = SteepConfig::default();
        let raw = toml::to_string_pretty(&config).unwrap();
        let back: SteepConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back.node.id, config.node.id);
        assert_eq!(back.database.max_connections, config.database.max_connections);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let raw = r#"
            [node]
            id = "east-1"

            [init]
            parallel_workers = 8
        "#;
        let config: SteepConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.node.id, "east-1");
        assert_eq!(config.init.parallel_workers, 8);
        assert_eq!(config.init.quiesce_timeout_ms, 30_000);
    }
}
