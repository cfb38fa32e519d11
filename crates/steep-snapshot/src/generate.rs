//! Snapshot generation.
//!
//! Export order: create the slot (binding the consistent LSN), enumerate
//! tables, fan the exports out over a worker pool, capture sequences, then
//! write the manifest and flip the snapshot row to `complete`. The slot is
//! dropped on every exit path; a generation that fails or is cancelled
//! leaves a `failed`/`cancelled` row and no dangling slot.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use crossbeam_queue::SegQueue;
use futures::TryStreamExt;
use sqlx::PgPool;
use sqlx::postgres::PgPoolCopyExt;
use steep_engine::catalog::{self, TableRef};
use steep_engine::meta::{self, SnapshotStatus};
use steep_engine::{ident, replication};
use steep_progress::{RollingWindow, eta_seconds};
use steep_types::{CompressionKind, Event, EventSink, NodeId};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::codec::{CompressedWriter, sha256_file};
use crate::error::{Result, SnapshotError};
use crate::manifest::{DATA_DIR, Manifest, SequenceEntry, TableEntry, table_file_name};
use crate::progress::{Step, overall_percent, step_name};

/// Configuration for one snapshot export.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Node being exported.
    pub source_node: NodeId,
    /// Root directory; the snapshot lands in `<root>/<snapshot_id>/`.
    pub root_dir: PathBuf,
    /// Compression for table files.
    pub compression: CompressionKind,
    /// Export workers (1..=16).
    pub parallel_workers: u16,
    /// Optional wall-clock expiry recorded on the snapshot row.
    pub expires_at: Option<DateTime<Utc>>,
    /// Keep the consistent-point slot after generation so a subscription
    /// can later bind to it (two-phase init). Default: drop it.
    pub keep_slot: bool,
}

/// Generates portable, verifiable snapshots of a node.
pub struct SnapshotGenerator {
    pool: PgPool,
    config: SnapshotConfig,
}

impl SnapshotGenerator {
    /// Creates a generator over the source node's pool.
    pub fn new(pool: PgPool, config: SnapshotConfig) -> Self {
        Self { pool, config }
    }

    /// Runs a full export and returns the manifest.
    pub async fn generate(
        &self,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<Manifest> {
        let snapshot_id = Uuid::new_v4();
        let slot = ident::snapshot_slot_name(&snapshot_id.to_string());

        let result = self.run(snapshot_id, &slot, cancel, sink).await;

        if let Err(err) = &result {
            let status = if matches!(err, SnapshotError::Cancelled) {
                SnapshotStatus::Cancelled
            } else {
                SnapshotStatus::Failed
            };
            if let Err(e) = meta::set_snapshot_status(&self.pool, snapshot_id, status, None).await {
                tracing::warn!(%snapshot_id, error = %e, "failed to record snapshot status");
            }
            if let Err(e) = replication::drop_slot(&self.pool, &slot).await {
                tracing::warn!(slot, error = %e, "failed to drop snapshot slot");
            }
        }
        result
    }

    async fn run(
        &self,
        snapshot_id: Uuid,
        slot: &str,
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<Manifest> {
        let snapshot_dir = self.config.root_dir.join(snapshot_id.to_string());
        fs::create_dir_all(snapshot_dir.join(DATA_DIR))?;

        sink.emit(&Event::SnapshotGenerationStarted {
            node: self.config.source_node.clone(),
            snapshot_id: snapshot_id.to_string(),
        });

        // The slot pins WAL from here on; its LSN is the consistent point
        // every exported row is ordered against.
        let lsn = replication::create_logical_slot(&self.pool, slot).await?;
        sink.emit(&Event::SnapshotSlotCreated {
            node: self.config.source_node.clone(),
            slot_name: slot.to_string(),
            lsn,
        });

        meta::insert_snapshot(
            &self.pool,
            snapshot_id,
            &self.config.source_node,
            lsn,
            &snapshot_dir.to_string_lossy(),
            self.config.compression.as_str(),
            self.config.expires_at,
        )
        .await?;
        meta::set_snapshot_status(&self.pool, snapshot_id, SnapshotStatus::Generating, None)
            .await?;

        let tables = catalog::list_user_tables(&self.pool).await?;
        let tables_total = tables.len() as u32;
        self.record_progress(snapshot_id, Step::Tables, 0.0, tables_total)
            .await;

        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }

        let mut entries = self
            .export_all(snapshot_id, &snapshot_dir, &tables, cancel)
            .await?;
        // Manifest lists tables in catalog order, not completion order.
        entries.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));

        self.record_progress(snapshot_id, Step::Sequences, f64::from(tables_total), tables_total)
            .await;
        let sequences: Vec<SequenceEntry> = catalog::list_sequences(&self.pool)
            .await?
            .into_iter()
            .map(|s| SequenceEntry {
                schema: s.schema,
                name: s.name,
                value: s.value,
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }

        self.record_progress(snapshot_id, Step::Finalizing, f64::from(tables_total), tables_total)
            .await;
        let total_size_bytes = entries.iter().map(|t| t.size_bytes).sum();
        let manifest = Manifest {
            snapshot_id,
            source_node: self.config.source_node.clone(),
            lsn,
            created_at: Utc::now(),
            compression: self.config.compression,
            parallel_workers: self.config.parallel_workers,
            total_size_bytes,
            tables: entries,
            sequences,
        };
        let manifest_path = manifest.write(&snapshot_dir)?;
        let manifest_checksum = sha256_file(&manifest_path)?;
        sink.emit(&Event::SnapshotManifestWritten {
            node: self.config.source_node.clone(),
            snapshot_id: snapshot_id.to_string(),
            path: manifest_path.to_string_lossy().into_owned(),
        });

        meta::set_snapshot_status(
            &self.pool,
            snapshot_id,
            SnapshotStatus::Complete,
            Some(&manifest_checksum),
        )
        .await?;
        if !self.config.keep_slot {
            replication::drop_slot(&self.pool, slot).await?;
        }

        sink.emit(&Event::SnapshotGenerationCompleted {
            node: self.config.source_node.clone(),
            snapshot_id: snapshot_id.to_string(),
            tables: manifest.tables.len(),
            total_size_bytes,
        });
        tracing::info!(
            %snapshot_id,
            tables = manifest.tables.len(),
            total_size_bytes,
            "snapshot generation complete"
        );
        Ok(manifest)
    }

    async fn export_all(
        &self,
        snapshot_id: Uuid,
        snapshot_dir: &Path,
        tables: &[catalog::TableSize],
        cancel: &CancellationToken,
    ) -> Result<Vec<TableEntry>> {
        let queue = Arc::new(SegQueue::new());
        for entry in tables {
            queue.push(entry.clone());
        }
        let tracker = Arc::new(TransferTracker::new(
            snapshot_id,
            tables.len() as u32,
            tables.iter().map(|t| t.size_bytes).sum(),
        ));
        // Child token: the first failed worker stops its peers without
        // cancelling the operation's own token.
        let worker_cancel = cancel.child_token();

        let workers = usize::from(self.config.parallel_workers.max(1));
        let mut join = JoinSet::new();
        for _ in 0..workers.min(tables.len().max(1)) {
            let pool = self.pool.clone();
            let queue = Arc::clone(&queue);
            let tracker = Arc::clone(&tracker);
            let token = worker_cancel.clone();
            let dir = snapshot_dir.to_path_buf();
            let compression = self.config.compression;

            join.spawn(async move {
                let mut entries = Vec::new();
                while let Some(task) = queue.pop() {
                    if token.is_cancelled() {
                        return Err(SnapshotError::Cancelled);
                    }
                    let entry = export_table(&pool, &dir, &task.table, compression).await?;
                    tracing::debug!(table = %task.table, rows = entry.row_count, "table exported");
                    tracker.table_done(&pool, task.size_bytes, entry.row_count).await;
                    entries.push(entry);
                }
                Ok(entries)
            });
        }

        let mut all = Vec::new();
        let mut first_error: Option<SnapshotError> = None;
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok(Ok(mut entries)) => all.append(&mut entries),
                Ok(Err(err)) => {
                    worker_cancel.cancel();
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    worker_cancel.cancel();
                    first_error.get_or_insert(SnapshotError::ExportFailed {
                        table: "<worker>".to_string(),
                        reason: join_err.to_string(),
                    });
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None if cancel.is_cancelled() => Err(SnapshotError::Cancelled),
            None => Ok(all),
        }
    }

    async fn record_progress(
        &self,
        snapshot_id: Uuid,
        step: Step,
        tables_done: f64,
        tables_total: u32,
    ) {
        let percent = overall_percent(step, tables_done, tables_total);
        if let Err(e) =
            meta::set_snapshot_progress(&self.pool, snapshot_id, step_name(step), percent).await
        {
            tracing::warn!(%snapshot_id, error = %e, "failed to record snapshot progress");
        }
    }
}

/// Shared transfer accounting across export workers.
///
/// Byte counts use catalog relation sizes, giving the rolling window and
/// ETA a consistent unit even though files land compressed.
struct TransferTracker {
    snapshot_id: Uuid,
    tables_total: u32,
    total_bytes: u64,
    tables_done: AtomicU32,
    bytes_done: AtomicU64,
    window: Mutex<RollingWindow>,
}

impl TransferTracker {
    fn new(snapshot_id: Uuid, tables_total: u32, total_bytes: u64) -> Self {
        Self {
            snapshot_id,
            tables_total,
            total_bytes,
            tables_done: AtomicU32::new(0),
            bytes_done: AtomicU64::new(0),
            window: Mutex::new(RollingWindow::default()),
        }
    }

    async fn table_done(&self, pool: &PgPool, catalog_bytes: u64, rows: u64) {
        let done = self.tables_done.fetch_add(1, Ordering::Relaxed) + 1;
        let bytes = self.bytes_done.fetch_add(catalog_bytes, Ordering::Relaxed) + catalog_bytes;
        let bps = {
            let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            window.record(catalog_bytes, rows);
            window.bytes_per_sec()
        };
        let eta = bps.and_then(|bps| eta_seconds(self.total_bytes.saturating_sub(bytes), bps));

        let percent = overall_percent(Step::Tables, f64::from(done), self.tables_total);
        if let Err(e) =
            meta::set_snapshot_progress(pool, self.snapshot_id, step_name(Step::Tables), percent)
                .await
        {
            tracing::warn!(snapshot_id = %self.snapshot_id, error = %e, "failed to record snapshot progress");
        }
        if let Err(e) = meta::set_snapshot_transfer(
            pool,
            self.snapshot_id,
            self.tables_total,
            done,
            bytes,
            bps,
            eta,
        )
        .await
        {
            tracing::warn!(snapshot_id = %self.snapshot_id, error = %e, "failed to record snapshot transfer");
        }
    }
}

/// Exports one table to its data file, returning the manifest entry.
async fn export_table(
    pool: &PgPool,
    snapshot_dir: &Path,
    table: &TableRef,
    compression: CompressionKind,
) -> Result<TableEntry> {
    let row_count = catalog::table_row_count(pool, table).await?;

    let rel_file = table_file_name(&table.schema, &table.name, compression);
    let path = snapshot_dir.join(&rel_file);
    let mut writer = CompressedWriter::create(&path, compression)?;

    let stmt = format!("COPY {} TO STDOUT WITH (FORMAT csv)", table.quoted());
    let mut stream = pool.copy_out_raw(&stmt).await?;
    while let Some(chunk) = stream.try_next().await? {
        writer.write_all(&chunk)?;
    }
    writer.finish()?;

    let size_bytes = fs::metadata(&path)?.len();
    let checksum = sha256_file(&path)?;
    Ok(TableEntry {
        schema: table.schema.clone(),
        name: table.name.clone(),
        row_count,
        size_bytes,
        checksum,
        file: rel_file,
    })
}
