//! Logical replication DDL and monitoring.
//!
//! Slot management, publication and subscription DDL, per-relation sync
//! state, lag probes, and session replication origins. DDL statements are
//! built from sanitized identifiers and quoted literals; parameter binding
//! is not available for utility commands.

use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Row};
use steep_types::Lsn;

use crate::error::{EngineError, Result};
use crate::ident::{quote_ident, quote_literal};

/// Logical decoding output plugin used for every slot Steep creates.
pub const OUTPUT_PLUGIN: &str = "pgoutput";

/// Specification for a subscription Steep is about to create.
///
/// `origin = none` is non-negotiable in an active-active topology: it keeps
/// changes that already carry an origin from being forwarded again and is
/// the sole loop-prevention mechanism (cycle A→B→A).
#[derive(Debug, Clone)]
pub struct SubscriptionSpec {
    /// Subscription name (already sanitized).
    pub name: String,
    /// Connection string to the source node.
    pub conninfo: String,
    /// Publication on the source to subscribe to.
    pub publication: String,
    /// Copy existing table data on create.
    pub copy_data: bool,
    /// Let the engine create the slot; otherwise `slot_name` must be set.
    pub create_slot: bool,
    /// Explicit slot to bind when `create_slot` is false.
    pub slot_name: Option<String>,
    /// Request parallel streaming of large transactions.
    pub streaming_parallel: bool,
}

impl SubscriptionSpec {
    /// Renders the CREATE SUBSCRIPTION statement.
    pub fn to_sql(&self) -> String {
        let mut options = vec![
            format!("copy_data = {}", self.copy_data),
            format!("create_slot = {}", self.create_slot),
            "origin = none".to_string(),
        ];
        if let Some(slot) = &self.slot_name {
            options.push(format!("slot_name = {}", quote_literal(slot)));
        }
        if self.streaming_parallel {
            options.push("streaming = parallel".to_string());
        }
        format!(
            "CREATE SUBSCRIPTION {} CONNECTION {} PUBLICATION {} WITH ({})",
            quote_ident(&self.name),
            quote_literal(&self.conninfo),
            quote_ident(&self.publication),
            options.join(", ")
        )
    }
}

/// Creates a subscription per `spec`.
pub async fn create_subscription(pool: &PgPool, spec: &SubscriptionSpec) -> Result<()> {
    sqlx::query(&spec.to_sql()).execute(pool).await?;
    tracing::info!(
        subscription = %spec.name,
        publication = %spec.publication,
        copy_data = spec.copy_data,
        "subscription created"
    );
    Ok(())
}

/// Drops a subscription if it exists, detaching its slot first so the
/// remote slot survives when `keep_slot` is set.
pub async fn drop_subscription(pool: &PgPool, name: &str, keep_slot: bool) -> Result<()> {
    if !subscription_exists(pool, name).await? {
        return Ok(());
    }
    if keep_slot {
        sqlx::query(&format!("ALTER SUBSCRIPTION {} DISABLE", quote_ident(name)))
            .execute(pool)
            .await?;
        sqlx::query(&format!(
            "ALTER SUBSCRIPTION {} SET (slot_name = NONE)",
            quote_ident(name)
        ))
        .execute(pool)
        .await?;
    }
    sqlx::query(&format!("DROP SUBSCRIPTION {}", quote_ident(name)))
        .execute(pool)
        .await?;
    tracing::info!(subscription = name, "subscription dropped");
    Ok(())
}

/// Enables or disables a subscription.
pub async fn set_subscription_enabled(pool: &PgPool, name: &str, enabled: bool) -> Result<()> {
    let verb = if enabled { "ENABLE" } else { "DISABLE" };
    sqlx::query(&format!("ALTER SUBSCRIPTION {} {verb}", quote_ident(name)))
        .execute(pool)
        .await?;
    Ok(())
}

/// Whether a subscription with this name exists.
pub async fn subscription_exists(pool: &PgPool, name: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 AS one FROM pg_subscription WHERE subname = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Subscriptions whose name starts with `prefix`.
pub async fn subscriptions_with_prefix(pool: &PgPool, prefix: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT subname FROM pg_subscription WHERE starts_with(subname, $1) ORDER BY subname",
    )
    .bind(prefix)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.get("subname")).collect())
}

/// Per-relation synchronization state of a subscription.
#[derive(Debug, Clone)]
pub struct RelationSyncState {
    /// Schema of the relation.
    pub schema: String,
    /// Relation name.
    pub table: String,
    /// Engine state code: i (init), d (data copy), f (finished copy),
    /// s (synchronized), r (ready).
    pub state: String,
}

impl RelationSyncState {
    /// True once streaming has fully caught up for this relation.
    pub fn is_ready(&self) -> bool {
        self.state == "r"
    }
}

/// Reads per-relation sync states for a subscription.
pub async fn relation_sync_states(pool: &PgPool, name: &str) -> Result<Vec<RelationSyncState>> {
    let rows = sqlx::query(
        "SELECT n.nspname AS schema, c.relname AS table, sr.srsubstate::text AS state \
         FROM pg_subscription_rel sr \
         JOIN pg_subscription s ON s.oid = sr.srsubid \
         JOIN pg_class c ON c.oid = sr.srrelid \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE s.subname = $1 \
         ORDER BY n.nspname, c.relname",
    )
    .bind(name)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RelationSyncState {
            schema: row.get("schema"),
            table: row.get("table"),
            state: row.get("state"),
        })
        .collect())
}

/// Resets the sync state of the given relations to "initialize needed" so
/// a re-enabled subscription recopies them.
pub async fn reset_relation_sync_state(
    pool: &PgPool,
    subscription: &str,
    tables: &[crate::TableRef],
) -> Result<()> {
    for table in tables {
        sqlx::query(
            "UPDATE pg_subscription_rel sr SET srsubstate = 'i', srsublsn = NULL \
             FROM pg_subscription s \
             WHERE s.oid = sr.srsubid AND s.subname = $1 AND sr.srrelid = $2::regclass",
        )
        .bind(subscription)
        .bind(table.quoted())
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Replication lag of a subscription in bytes, together with the number of
/// live workers. Lag is `latest_end_lsn - received_lsn`.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionLag {
    /// WAL bytes not yet received.
    pub lag_bytes: u64,
    /// Apply and sync workers currently running.
    pub workers: u32,
}

/// Probes lag and worker count for a subscription.
pub async fn subscription_lag(pool: &PgPool, name: &str) -> Result<SubscriptionLag> {
    let rows = sqlx::query(
        "SELECT st.received_lsn::text AS received, st.latest_end_lsn::text AS latest_end \
         FROM pg_stat_subscription st \
         JOIN pg_subscription s ON s.oid = st.subid \
         WHERE s.subname = $1 AND st.pid IS NOT NULL",
    )
    .bind(name)
    .fetch_all(pool)
    .await?;

    let workers = rows.len() as u32;
    let mut lag_bytes = 0u64;
    for row in rows {
        let received: Option<String> = row.get("received");
        let latest: Option<String> = row.get("latest_end");
        if let (Some(received), Some(latest)) = (received, latest) {
            let received: Lsn = received.parse()?;
            let latest: Lsn = latest.parse()?;
            lag_bytes = lag_bytes.max(latest.delta(received));
        }
    }
    Ok(SubscriptionLag { lag_bytes, workers })
}

/// Creates a logical replication slot and returns its consistent point.
pub async fn create_logical_slot(pool: &PgPool, slot: &str) -> Result<Lsn> {
    if slot_exists(pool, slot).await? {
        return Err(EngineError::SlotExists(slot.to_string()));
    }
    let row = sqlx::query(
        "SELECT lsn::text AS lsn FROM pg_create_logical_replication_slot($1, $2)",
    )
    .bind(slot)
    .bind(OUTPUT_PLUGIN)
    .fetch_one(pool)
    .await?;
    let lsn: Lsn = row.get::<String, _>("lsn").parse()?;
    tracing::info!(slot, %lsn, "logical replication slot created");
    Ok(lsn)
}

/// Whether a replication slot with this name exists.
pub async fn slot_exists(pool: &PgPool, slot: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 AS one FROM pg_replication_slots WHERE slot_name = $1")
        .bind(slot)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Drops a replication slot if it exists. Best effort: an active slot
/// surfaces the engine's error.
pub async fn drop_slot(pool: &PgPool, slot: &str) -> Result<()> {
    if !slot_exists(pool, slot).await? {
        return Ok(());
    }
    sqlx::query("SELECT pg_drop_replication_slot($1)")
        .bind(slot)
        .execute(pool)
        .await?;
    tracing::debug!(slot, "replication slot dropped");
    Ok(())
}

/// Returns the active slots whose name starts with `prefix`.
///
/// Used by Prepare to refuse creating an init slot that bidirectional
/// streaming would orphan.
pub async fn active_slots_with_prefix(pool: &PgPool, prefix: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT slot_name FROM pg_replication_slots \
         WHERE starts_with(slot_name, $1) AND active \
         ORDER BY slot_name",
    )
    .bind(prefix)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.get("slot_name")).collect())
}

/// Discovers a publication on the source: prefer one declared
/// `FOR ALL TABLES`, else fall back to the conventional name.
pub async fn discover_publication(pool: &PgPool, conventional: &str) -> Result<Option<String>> {
    let row = sqlx::query(
        "SELECT pubname FROM pg_publication WHERE puballtables ORDER BY pubname LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    if let Some(row) = row {
        return Ok(Some(row.get("pubname")));
    }
    let row = sqlx::query("SELECT pubname FROM pg_publication WHERE pubname = $1")
        .bind(conventional)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("pubname")))
}

/// Creates a `FOR ALL TABLES` publication if absent.
pub async fn ensure_publication(pool: &PgPool, name: &str) -> Result<()> {
    let exists = sqlx::query("SELECT 1 AS one FROM pg_publication WHERE pubname = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .is_some();
    if exists {
        return Ok(());
    }
    sqlx::query(&format!(
        "CREATE PUBLICATION {} FOR ALL TABLES",
        quote_ident(name)
    ))
    .execute(pool)
    .await?;
    tracing::info!(publication = name, "publication created");
    Ok(())
}

/// Sets up a session replication origin on a dedicated connection.
///
/// Changes made on this session carry the origin tag, so `origin = none`
/// subscriptions on peers filter them out. The origin is created on first
/// use and the session association is reset by [`reset_session_origin`].
pub async fn setup_session_origin(conn: &mut PgConnection, origin: &str) -> Result<()> {
    let exists = sqlx::query("SELECT 1 AS one FROM pg_replication_origin WHERE roname = $1")
        .bind(origin)
        .fetch_optional(&mut *conn)
        .await?
        .is_some();
    if !exists {
        sqlx::query("SELECT pg_replication_origin_create($1)")
            .bind(origin)
            .execute(&mut *conn)
            .await?;
    }
    sqlx::query("SELECT pg_replication_origin_session_setup($1)")
        .bind(origin)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Clears the session's replication origin association.
pub async fn reset_session_origin(conn: &mut PgConnection) -> Result<()> {
    sqlx::query("SELECT pg_replication_origin_session_reset()")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// A row of the engine's COPY progress view.
#[derive(Debug, Clone)]
pub struct CopyProgress {
    /// Relation being copied, qualified.
    pub relation: String,
    /// Bytes processed so far.
    pub bytes_processed: u64,
    /// Total bytes, when the engine can estimate it.
    pub bytes_total: u64,
    /// Tuples processed so far.
    pub tuples_processed: u64,
}

/// Reads the instance-wide COPY progress view.
pub async fn copy_progress(pool: &PgPool) -> Result<Vec<CopyProgress>> {
    let rows = sqlx::query(
        "SELECT relid::regclass::text AS relation, bytes_processed, bytes_total, \
                tuples_processed \
         FROM pg_stat_progress_copy",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CopyProgress {
            relation: row.get("relation"),
            bytes_processed: row.get::<i64, _>("bytes_processed").max(0) as u64,
            bytes_total: row.get::<i64, _>("bytes_total").max(0) as u64,
            tuples_processed: row.get::<i64, _>("tuples_processed").max(0) as u64,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_sql_with_engine_slot() {
        let spec = SubscriptionSpec {
            name: "steep_sub_b_from_a".to_string(),
            conninfo: "host=a dbname=app".to_string(),
            publication: "steep_pub_a".to_string(),
            copy_data: true,
            create_slot: true,
            slot_name: None,
            streaming_parallel: true,
        };
        let sql = spec.to_sql();
        assert!(sql.starts_with("CREATE SUBSCRIPTION \"steep_sub_b_from_a\""));
        assert!(sql.contains("CONNECTION 'host=a dbname=app'"));
        assert!(sql.contains("PUBLICATION \"steep_pub_a\""));
        assert!(sql.contains("copy_data = true"));
        assert!(sql.contains("create_slot = true"));
        assert!(sql.contains("origin = none"));
        assert!(sql.contains("streaming = parallel"));
    }

    #[test]
    fn subscription_sql_with_prepared_slot() {
        let spec = SubscriptionSpec {
            name: "steep_sub_b_from_a".to_string(),
            conninfo: "host=a".to_string(),
            publication: "steep_pub_a".to_string(),
            copy_data: false,
            create_slot: false,
            slot_name: Some("steep_init_a".to_string()),
            streaming_parallel: false,
        };
        let sql = spec.to_sql();
        assert!(sql.contains("copy_data = false"));
        assert!(sql.contains("create_slot = false"));
        assert!(sql.contains("slot_name = 'steep_init_a'"));
        assert!(!sql.contains("streaming"));
    }

    #[test]
    fn subscription_sql_escapes_conninfo() {
        let spec = SubscriptionSpec {
            name: "s".to_string(),
            conninfo: "password=it's".to_string(),
            publication: "p".to_string(),
            copy_data: false,
            create_slot: true,
            slot_name: None,
            streaming_parallel: false,
        };
        assert!(spec.to_sql().contains("'password=it''s'"));
    }

    #[test]
    fn relation_ready_state() {
        let ready = RelationSyncState {
            schema: "public".to_string(),
            table: "orders".to_string(),
            state: "r".to_string(),
        };
        assert!(ready.is_ready());
        let copying = RelationSyncState {
            state: "d".to_string(),
            ..ready
        };
        assert!(!copying.is_ready());
    }
}
