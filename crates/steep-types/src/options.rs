//! Per-operation options.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CompressionKind, Error, InitMethod, Result};

/// Bounds for `parallel_workers`.
pub const MIN_PARALLEL_WORKERS: u16 = 1;
/// Upper bound for `parallel_workers`.
pub const MAX_PARALLEL_WORKERS: u16 = 16;

/// How schema differences between nodes are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaSyncMode {
    /// Reject the operation on any fingerprint mismatch.
    #[default]
    Strict,
    /// Would apply DDL to converge; not implemented, rejected at validation.
    Auto,
    /// Warn on mismatch and continue.
    Manual,
}

impl SchemaSyncMode {
    /// Stable string form.
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaSyncMode::Strict => "strict",
            SchemaSyncMode::Auto => "auto",
            SchemaSyncMode::Manual => "manual",
        }
    }
}

impl Display for SchemaSyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaSyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(SchemaSyncMode::Strict),
            "auto" => Ok(SchemaSyncMode::Auto),
            "manual" => Ok(SchemaSyncMode::Manual),
            other => Err(Error::UnknownSchemaSync(other.to_string())),
        }
    }
}

/// Handling for tables above `large_table_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LargeTableMethod {
    /// Copy anyway, logging a warning per oversized table.
    #[default]
    Copy,
    /// Fail fast so the operator can stage the table out of band.
    Exclude,
}

/// Inputs specific to the bidirectional-merge method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Tables to merge, schema-qualified (`schema.table`).
    pub tables: Vec<String>,
    /// Conflict strategy name (`prefer-node-a`, `prefer-node-b`,
    /// `last-modified`, `manual`).
    pub strategy: String,
    /// Connection string to the remote node, overriding its registered
    /// endpoint.
    pub remote_conninfo: Option<String>,
}

/// Options accepted by `StartInit` and friends.
///
/// Defaults match the daemon's shipping configuration: four workers, gzip
/// snapshots, strict schema checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitOptions {
    /// Initialization method to dispatch.
    pub method: InitMethod,
    /// Parallel workers for initial copy / snapshot export (1..=16).
    pub parallel_workers: u16,
    /// Schema difference handling.
    pub schema_sync: SchemaSyncMode,
    /// Size above which a table is considered large, in bytes.
    pub large_table_threshold: Option<u64>,
    /// What to do with large tables.
    pub large_table_method: LargeTableMethod,
    /// Compression for snapshot exports.
    pub snapshot_compression: CompressionKind,
    /// Per-table quiesce acquisition timeout for merges, in milliseconds.
    pub quiesce_timeout_ms: u64,
    /// Analyze only; make no data changes (merge).
    pub dry_run: bool,
    /// Merge-method inputs; ignored by other methods.
    pub merge: Option<MergeOptions>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            method: InitMethod::Snapshot,
            parallel_workers: 4,
            schema_sync: SchemaSyncMode::Strict,
            large_table_threshold: None,
            large_table_method: LargeTableMethod::Copy,
            snapshot_compression: CompressionKind::Gzip,
            quiesce_timeout_ms: 30_000,
            dry_run: false,
            merge: None,
        }
    }
}

impl InitOptions {
    /// Creates options for the given method with shipping defaults.
    pub fn for_method(method: InitMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Validates option ranges.
    ///
    /// Method- and mode-level checks (unsupported method, `auto` schema
    /// sync) belong to the Init Manager; this covers numeric ranges only.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PARALLEL_WORKERS..=MAX_PARALLEL_WORKERS).contains(&self.parallel_workers) {
            return Err(Error::InvalidOption {
                option: "parallel_workers",
                reason: format!(
                    "{} outside {MIN_PARALLEL_WORKERS}..={MAX_PARALLEL_WORKERS}",
                    self.parallel_workers
                ),
            });
        }
        if self.quiesce_timeout_ms == 0 {
            return Err(Error::InvalidOption {
                option: "quiesce_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        InitOptions::default().validate().unwrap();
    }

    #[test]
    fn worker_bounds_enforced() {
        let mut opts = InitOptions::default();
        opts.parallel_workers = 0;
        assert!(opts.validate().is_err());
        opts.parallel_workers = 17;
        assert!(opts.validate().is_err());
        opts.parallel_workers = 16;
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn zero_quiesce_timeout_rejected() {
        let mut opts = InitOptions::default();
        opts.quiesce_timeout_ms = 0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn schema_sync_parse() {
        assert_eq!(
            "strict".parse::<SchemaSyncMode>().unwrap(),
            SchemaSyncMode::Strict
        );
        assert_eq!(
            "auto".parse::<SchemaSyncMode>().unwrap(),
            SchemaSyncMode::Auto
        );
        assert!("ddl".parse::<SchemaSyncMode>().is_err());
    }
}
