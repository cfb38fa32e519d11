//! The `steep` metadata namespace.
//!
//! Every persistent control-plane entity lives in the `steep` schema on the
//! engine: registered nodes, prepared init slots, snapshots, progress
//! records, schema fingerprints, and the merge audit. Tables are created
//! idempotently by [`ensure_schema`].

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use steep_types::{InitProgress, InitState, Lsn, NodeId, ProgressPhase};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Creates the `steep` schema and its tables if missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query("CREATE SCHEMA IF NOT EXISTS steep")
        .execute(pool)
        .await?;

    for ddl in [
        "CREATE TABLE IF NOT EXISTS steep.nodes (
            node_id TEXT PRIMARY KEY,
            name TEXT,
            endpoint TEXT,
            priority INT NOT NULL DEFAULT 0,
            init_state TEXT NOT NULL DEFAULT 'uninitialized',
            init_source_node TEXT,
            init_started_at TIMESTAMPTZ,
            init_completed_at TIMESTAMPTZ,
            last_sync_throughput_bps BIGINT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "CREATE TABLE IF NOT EXISTS steep.init_slots (
            slot_name TEXT PRIMARY KEY,
            node_id TEXT NOT NULL,
            lsn TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            expires_at TIMESTAMPTZ NOT NULL,
            used_by_node TEXT,
            used_at TIMESTAMPTZ
        )",
        "CREATE TABLE IF NOT EXISTS steep.snapshots (
            snapshot_id UUID PRIMARY KEY,
            source_node TEXT NOT NULL,
            lsn TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            compression TEXT NOT NULL,
            checksum TEXT,
            status TEXT NOT NULL,
            phase TEXT,
            overall_percent DOUBLE PRECISION NOT NULL DEFAULT 0,
            tables_total INT NOT NULL DEFAULT 0,
            tables_completed INT NOT NULL DEFAULT 0,
            bytes_copied BIGINT NOT NULL DEFAULT 0,
            throughput_bps BIGINT,
            eta_seconds BIGINT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            expires_at TIMESTAMPTZ
        )",
        "CREATE TABLE IF NOT EXISTS steep.init_progress (
            node_id TEXT PRIMARY KEY,
            phase TEXT NOT NULL,
            overall_percent DOUBLE PRECISION NOT NULL DEFAULT 0,
            tables_total INT NOT NULL DEFAULT 0,
            tables_completed INT NOT NULL DEFAULT 0,
            current_table TEXT,
            rows_copied BIGINT NOT NULL DEFAULT 0,
            bytes_copied BIGINT NOT NULL DEFAULT 0,
            throughput_bps BIGINT,
            eta_seconds BIGINT,
            started_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            error TEXT
        )",
        "CREATE TABLE IF NOT EXISTS steep.schema_fingerprints (
            node_id TEXT NOT NULL,
            schema_name TEXT NOT NULL,
            table_name TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            column_count INT NOT NULL,
            captured_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (node_id, schema_name, table_name)
        )",
        "CREATE TABLE IF NOT EXISTS steep.merge_audit (
            id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
            merge_id UUID NOT NULL,
            schema_name TEXT NOT NULL,
            table_name TEXT NOT NULL,
            pk_value TEXT NOT NULL,
            category TEXT NOT NULL,
            resolution TEXT NOT NULL,
            node_a_value TEXT,
            node_b_value TEXT,
            resolved_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

/// A registered node.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// Node id.
    pub node_id: NodeId,
    /// Display name.
    pub name: Option<String>,
    /// Network endpoint (connection string).
    pub endpoint: Option<String>,
    /// Failover priority.
    pub priority: i32,
    /// Current init state.
    pub init_state: InitState,
    /// Source node of the last initialization.
    pub init_source_node: Option<NodeId>,
    /// When the last initialization started.
    pub init_started_at: Option<DateTime<Utc>>,
    /// When the last initialization completed.
    pub init_completed_at: Option<DateTime<Utc>>,
    /// Observed throughput of the last sync, bytes per second.
    pub last_sync_throughput_bps: Option<u64>,
}

fn node_from_row(row: &sqlx::postgres::PgRow) -> Result<NodeRecord> {
    Ok(NodeRecord {
        node_id: NodeId::new(row.get::<String, _>("node_id")),
        name: row.get("name"),
        endpoint: row.get("endpoint"),
        priority: row.get("priority"),
        init_state: row.get::<String, _>("init_state").parse()?,
        init_source_node: row
            .get::<Option<String>, _>("init_source_node")
            .map(NodeId::new),
        init_started_at: row.get("init_started_at"),
        init_completed_at: row.get("init_completed_at"),
        last_sync_throughput_bps: row
            .get::<Option<i64>, _>("last_sync_throughput_bps")
            .map(|v| v.max(0) as u64),
    })
}

/// Registers a node, updating name/endpoint when it already exists.
pub async fn register_node(
    pool: &PgPool,
    node: &NodeId,
    name: Option<&str>,
    endpoint: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO steep.nodes (node_id, name, endpoint) VALUES ($1, $2, $3) \
         ON CONFLICT (node_id) DO UPDATE SET \
             name = COALESCE(EXCLUDED.name, steep.nodes.name), \
             endpoint = COALESCE(EXCLUDED.endpoint, steep.nodes.endpoint)",
    )
    .bind(node.as_str())
    .bind(name)
    .bind(endpoint)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetches a node record.
pub async fn get_node(pool: &PgPool, node: &NodeId) -> Result<Option<NodeRecord>> {
    let row = sqlx::query("SELECT * FROM steep.nodes WHERE node_id = $1")
        .bind(node.as_str())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(node_from_row).transpose()
}

/// Fetches a node record, failing when the node is unknown.
pub async fn require_node(pool: &PgPool, node: &NodeId) -> Result<NodeRecord> {
    get_node(pool, node)
        .await?
        .ok_or_else(|| EngineError::NodeNotFound(node.to_string()))
}

/// Writes a node's init state. Transition validation is the Init Manager's
/// job; this is the raw durable write.
pub async fn set_node_state(pool: &PgPool, node: &NodeId, state: InitState) -> Result<()> {
    sqlx::query("UPDATE steep.nodes SET init_state = $2 WHERE node_id = $1")
        .bind(node.as_str())
        .bind(state.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

/// Records the source and start time of an initialization.
pub async fn mark_init_started(pool: &PgPool, node: &NodeId, source: &NodeId) -> Result<()> {
    sqlx::query(
        "UPDATE steep.nodes SET init_source_node = $2, init_started_at = now(), \
         init_completed_at = NULL WHERE node_id = $1",
    )
    .bind(node.as_str())
    .bind(source.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Records initialization completion time.
pub async fn mark_init_completed(pool: &PgPool, node: &NodeId) -> Result<()> {
    sqlx::query("UPDATE steep.nodes SET init_completed_at = now() WHERE node_id = $1")
        .bind(node.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

/// Persists the observed sync throughput as the ETA baseline for the next
/// initialization of this node.
pub async fn set_last_sync_throughput(pool: &PgPool, node: &NodeId, bps: u64) -> Result<()> {
    sqlx::query("UPDATE steep.nodes SET last_sync_throughput_bps = $2 WHERE node_id = $1")
        .bind(node.as_str())
        .bind(bps as i64)
        .execute(pool)
        .await?;
    Ok(())
}

/// A prepared init slot.
#[derive(Debug, Clone)]
pub struct SlotRecord {
    /// Slot name.
    pub slot_name: String,
    /// Node the slot was created on.
    pub node_id: NodeId,
    /// Consistent point captured at creation.
    pub lsn: Lsn,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Expiry; unexpired and unused slots are "available".
    pub expires_at: DateTime<Utc>,
    /// Node that consumed the slot, if any.
    pub used_by_node: Option<NodeId>,
    /// When the slot was consumed.
    pub used_at: Option<DateTime<Utc>>,
}

fn slot_from_row(row: &sqlx::postgres::PgRow) -> Result<SlotRecord> {
    Ok(SlotRecord {
        slot_name: row.get("slot_name"),
        node_id: NodeId::new(row.get::<String, _>("node_id")),
        lsn: row.get::<String, _>("lsn").parse()?,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        used_by_node: row.get::<Option<String>, _>("used_by_node").map(NodeId::new),
        used_at: row.get("used_at"),
    })
}

/// Records a prepared slot.
pub async fn insert_slot(
    pool: &PgPool,
    slot_name: &str,
    node: &NodeId,
    lsn: Lsn,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO steep.init_slots (slot_name, node_id, lsn, expires_at) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(slot_name)
    .bind(node.as_str())
    .bind(lsn.to_string())
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetches a slot record by name.
pub async fn get_slot(pool: &PgPool, slot_name: &str) -> Result<Option<SlotRecord>> {
    let row = sqlx::query("SELECT * FROM steep.init_slots WHERE slot_name = $1")
        .bind(slot_name)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(slot_from_row).transpose()
}

/// Most recent unused, unexpired slot prepared on `node`.
pub async fn latest_available_slot(pool: &PgPool, node: &NodeId) -> Result<Option<SlotRecord>> {
    let row = sqlx::query(
        "SELECT * FROM steep.init_slots \
         WHERE node_id = $1 AND used_by_node IS NULL AND expires_at > now() \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(node.as_str())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(slot_from_row).transpose()
}

/// Marks a slot as consumed by `used_by`.
///
/// A slot already consumed by a different node is never reusable; that
/// surfaces as [`EngineError::SlotAlreadyUsed`].
pub async fn mark_slot_used(pool: &PgPool, slot_name: &str, used_by: &NodeId) -> Result<()> {
    let result = sqlx::query(
        "UPDATE steep.init_slots SET used_by_node = $2, used_at = now() \
         WHERE slot_name = $1 AND (used_by_node IS NULL OR used_by_node = $2)",
    )
    .bind(slot_name)
    .bind(used_by.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let holder = get_slot(pool, slot_name)
            .await?
            .and_then(|s| s.used_by_node)
            .map_or_else(|| "unknown".to_string(), |n| n.to_string());
        return Err(EngineError::SlotAlreadyUsed {
            slot: slot_name.to_string(),
            used_by: holder,
        });
    }
    Ok(())
}

/// Lifecycle status of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// Created, not yet generating.
    Pending,
    /// Export in progress.
    Generating,
    /// Export finished; manifest durable.
    Complete,
    /// Replay into a target in progress.
    Applying,
    /// Replay finished.
    Applied,
    /// Generation or apply failed.
    Failed,
    /// Cancelled by the operator.
    Cancelled,
    /// Expired by wall clock.
    Expired,
}

impl SnapshotStatus {
    /// Stable string form.
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotStatus::Pending => "pending",
            SnapshotStatus::Generating => "generating",
            SnapshotStatus::Complete => "complete",
            SnapshotStatus::Applying => "applying",
            SnapshotStatus::Applied => "applied",
            SnapshotStatus::Failed => "failed",
            SnapshotStatus::Cancelled => "cancelled",
            SnapshotStatus::Expired => "expired",
        }
    }
}

impl Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotStatus {
    type Err = steep_types::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SnapshotStatus::Pending),
            "generating" => Ok(SnapshotStatus::Generating),
            "complete" => Ok(SnapshotStatus::Complete),
            "applying" => Ok(SnapshotStatus::Applying),
            "applied" => Ok(SnapshotStatus::Applied),
            "failed" => Ok(SnapshotStatus::Failed),
            "cancelled" => Ok(SnapshotStatus::Cancelled),
            "expired" => Ok(SnapshotStatus::Expired),
            other => Err(steep_types::Error::UnknownState(other.to_string())),
        }
    }
}

/// A recorded snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    /// Snapshot id.
    pub snapshot_id: Uuid,
    /// Node the snapshot was exported from.
    pub source_node: NodeId,
    /// Consistent point of the export.
    pub lsn: Lsn,
    /// Directory holding manifest and data files.
    pub storage_path: String,
    /// Compression kind, stable string form.
    pub compression: String,
    /// Manifest checksum once generation finished.
    pub checksum: Option<String>,
    /// Lifecycle status.
    pub status: SnapshotStatus,
    /// Free-form phase detail.
    pub phase: Option<String>,
    /// Overall percent complete.
    pub overall_percent: f64,
}

/// Inserts a snapshot row in `pending` status.
pub async fn insert_snapshot(
    pool: &PgPool,
    snapshot_id: Uuid,
    source_node: &NodeId,
    lsn: Lsn,
    storage_path: &str,
    compression: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO steep.snapshots \
         (snapshot_id, source_node, lsn, storage_path, compression, status, expires_at) \
         VALUES ($1, $2, $3, $4, $5, 'pending', $6)",
    )
    .bind(snapshot_id)
    .bind(source_node.as_str())
    .bind(lsn.to_string())
    .bind(storage_path)
    .bind(compression)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Updates a snapshot's status, and checksum when provided.
pub async fn set_snapshot_status(
    pool: &PgPool,
    snapshot_id: Uuid,
    status: SnapshotStatus,
    checksum: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE steep.snapshots SET status = $2, \
         checksum = COALESCE($3, checksum), \
         overall_percent = CASE WHEN $2 IN ('complete', 'applied') THEN 100 \
                                ELSE overall_percent END \
         WHERE snapshot_id = $1",
    )
    .bind(snapshot_id)
    .bind(status.as_str())
    .bind(checksum)
    .execute(pool)
    .await?;
    Ok(())
}

/// Updates a snapshot's phase and percent.
pub async fn set_snapshot_progress(
    pool: &PgPool,
    snapshot_id: Uuid,
    phase: &str,
    percent: f64,
) -> Result<()> {
    sqlx::query(
        "UPDATE steep.snapshots SET phase = $2, overall_percent = $3 WHERE snapshot_id = $1",
    )
    .bind(snapshot_id)
    .bind(phase)
    .bind(percent)
    .execute(pool)
    .await?;
    Ok(())
}

/// Updates a snapshot's transfer counters and rate estimates.
pub async fn set_snapshot_transfer(
    pool: &PgPool,
    snapshot_id: Uuid,
    tables_total: u32,
    tables_completed: u32,
    bytes_copied: u64,
    throughput_bps: Option<u64>,
    eta_seconds: Option<u64>,
) -> Result<()> {
    sqlx::query(
        "UPDATE steep.snapshots SET tables_total = $2, tables_completed = $3, \
         bytes_copied = $4, throughput_bps = $5, eta_seconds = $6 \
         WHERE snapshot_id = $1",
    )
    .bind(snapshot_id)
    .bind(tables_total as i32)
    .bind(tables_completed as i32)
    .bind(bytes_copied as i64)
    .bind(throughput_bps.map(|v| v as i64))
    .bind(eta_seconds.map(|v| v as i64))
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetches a snapshot record.
pub async fn get_snapshot(pool: &PgPool, snapshot_id: Uuid) -> Result<Option<SnapshotRecord>> {
    let row = sqlx::query("SELECT * FROM steep.snapshots WHERE snapshot_id = $1")
        .bind(snapshot_id)
        .fetch_optional(pool)
        .await?;

    row.map(|row| {
        Ok(SnapshotRecord {
            snapshot_id: row.get("snapshot_id"),
            source_node: NodeId::new(row.get::<String, _>("source_node")),
            lsn: row.get::<String, _>("lsn").parse()?,
            storage_path: row.get("storage_path"),
            compression: row.get("compression"),
            checksum: row.get("checksum"),
            status: row.get::<String, _>("status").parse()?,
            phase: row.get("phase"),
            overall_percent: row.get("overall_percent"),
        })
    })
    .transpose()
}

/// Upserts the progress record for a node.
pub async fn upsert_progress(pool: &PgPool, progress: &InitProgress) -> Result<()> {
    sqlx::query(
        "INSERT INTO steep.init_progress \
         (node_id, phase, overall_percent, tables_total, tables_completed, current_table, \
          rows_copied, bytes_copied, throughput_bps, eta_seconds, started_at, updated_at, error) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (node_id) DO UPDATE SET \
             phase = EXCLUDED.phase, \
             overall_percent = EXCLUDED.overall_percent, \
             tables_total = EXCLUDED.tables_total, \
             tables_completed = EXCLUDED.tables_completed, \
             current_table = EXCLUDED.current_table, \
             rows_copied = EXCLUDED.rows_copied, \
             bytes_copied = EXCLUDED.bytes_copied, \
             throughput_bps = EXCLUDED.throughput_bps, \
             eta_seconds = EXCLUDED.eta_seconds, \
             updated_at = EXCLUDED.updated_at, \
             error = EXCLUDED.error",
    )
    .bind(progress.node.as_str())
    .bind(progress.phase.as_str())
    .bind(progress.overall_percent)
    .bind(progress.tables_total as i32)
    .bind(progress.tables_completed as i32)
    .bind(&progress.current_table)
    .bind(progress.rows_copied as i64)
    .bind(progress.bytes_copied as i64)
    .bind(progress.throughput_bps.map(|v| v as i64))
    .bind(progress.eta_seconds.map(|v| v as i64))
    .bind(progress.started_at)
    .bind(progress.updated_at)
    .bind(&progress.error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Point-reads the progress record for a node.
pub async fn get_progress(pool: &PgPool, node: &NodeId) -> Result<Option<InitProgress>> {
    let row = sqlx::query("SELECT * FROM steep.init_progress WHERE node_id = $1")
        .bind(node.as_str())
        .fetch_optional(pool)
        .await?;

    row.map(|row| {
        let phase: ProgressPhase = row.get::<String, _>("phase").parse()?;
        Ok(InitProgress {
            node: NodeId::new(row.get::<String, _>("node_id")),
            phase,
            overall_percent: row.get("overall_percent"),
            tables_total: row.get::<i32, _>("tables_total").max(0) as u32,
            tables_completed: row.get::<i32, _>("tables_completed").max(0) as u32,
            current_table: row.get("current_table"),
            rows_copied: row.get::<i64, _>("rows_copied").max(0) as u64,
            bytes_copied: row.get::<i64, _>("bytes_copied").max(0) as u64,
            throughput_bps: row.get::<Option<i64>, _>("throughput_bps").map(|v| v.max(0) as u64),
            eta_seconds: row.get::<Option<i64>, _>("eta_seconds").map(|v| v.max(0) as u64),
            started_at: row.get("started_at"),
            updated_at: row.get("updated_at"),
            error: row.get("error"),
        })
    })
    .transpose()
}

/// Clears the progress record for a node.
pub async fn clear_progress(pool: &PgPool, node: &NodeId) -> Result<()> {
    sqlx::query("DELETE FROM steep.init_progress WHERE node_id = $1")
        .bind(node.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

/// One captured table fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRow {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Deterministic hash over ordered column metadata.
    pub fingerprint: String,
    /// Number of columns hashed.
    pub column_count: u32,
}

/// Upserts captured fingerprints for a node.
pub async fn upsert_fingerprints(
    pool: &PgPool,
    node: &NodeId,
    rows: &[FingerprintRow],
) -> Result<()> {
    for fp in rows {
        sqlx::query(
            "INSERT INTO steep.schema_fingerprints \
             (node_id, schema_name, table_name, fingerprint, column_count, captured_at) \
             VALUES ($1, $2, $3, $4, $5, now()) \
             ON CONFLICT (node_id, schema_name, table_name) DO UPDATE SET \
                 fingerprint = EXCLUDED.fingerprint, \
                 column_count = EXCLUDED.column_count, \
                 captured_at = EXCLUDED.captured_at",
        )
        .bind(node.as_str())
        .bind(&fp.schema)
        .bind(&fp.table)
        .bind(&fp.fingerprint)
        .bind(fp.column_count as i32)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Captured fingerprints for a node, keyed by `schema.table`.
pub async fn fingerprints_for_node(
    pool: &PgPool,
    node: &NodeId,
) -> Result<BTreeMap<String, String>> {
    let rows = sqlx::query(
        "SELECT schema_name, table_name, fingerprint \
         FROM steep.schema_fingerprints WHERE node_id = $1",
    )
    .bind(node.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            (
                format!(
                    "{}.{}",
                    row.get::<String, _>("schema_name"),
                    row.get::<String, _>("table_name")
                ),
                row.get::<String, _>("fingerprint"),
            )
        })
        .collect())
}

/// One merge decision, appended to the audit.
#[derive(Debug, Clone)]
pub struct MergeAuditRow {
    /// Merge operation id.
    pub merge_id: Uuid,
    /// Schema of the affected table.
    pub schema: String,
    /// Affected table.
    pub table: String,
    /// Primary key value, rendered as text.
    pub pk_value: String,
    /// Overlap category that produced the decision.
    pub category: String,
    /// Resolution applied.
    pub resolution: String,
    /// Node A's row content hash or value, if captured.
    pub node_a_value: Option<String>,
    /// Node B's row content hash or value, if captured.
    pub node_b_value: Option<String>,
}

/// Appends one merge audit entry.
pub async fn append_merge_audit(pool: &PgPool, row: &MergeAuditRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO steep.merge_audit \
         (merge_id, schema_name, table_name, pk_value, category, resolution, \
          node_a_value, node_b_value) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(row.merge_id)
    .bind(&row.schema)
    .bind(&row.table)
    .bind(&row.pk_value)
    .bind(&row.category)
    .bind(&row.resolution)
    .bind(&row.node_a_value)
    .bind(&row.node_b_value)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_status_roundtrip() {
        for status in [
            SnapshotStatus::Pending,
            SnapshotStatus::Generating,
            SnapshotStatus::Complete,
            SnapshotStatus::Applying,
            SnapshotStatus::Applied,
            SnapshotStatus::Failed,
            SnapshotStatus::Cancelled,
            SnapshotStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<SnapshotStatus>().unwrap(), status);
        }
        assert!("done".parse::<SnapshotStatus>().is_err());
    }
}
