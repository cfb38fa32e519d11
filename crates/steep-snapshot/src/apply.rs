//! Snapshot apply.
//!
//! Replays a verified snapshot into a target node: every table file is
//! streamed through the codec into a COPY, then sequences are restored.
//! Apply assumes the target's tables exist (schema is verified upstream)
//! and refuses to load into populated ones. The snapshot row moves
//! through `applying` to `applied`, or to `failed` when the replay
//! breaks.

use std::io::Read;
use std::path::PathBuf;

use sqlx::postgres::PgPoolCopyExt;
use sqlx::{PgPool, Row};
use steep_engine::catalog::TableRef;
use steep_engine::ident::quote_ident;
use steep_engine::meta::{self, SnapshotStatus};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::codec::CompressedReader;
use crate::error::{Result, SnapshotError};
use crate::manifest::Manifest;
use crate::verify::verify_snapshot_strict;

const CHUNK: usize = 64 * 1024;

/// Outcome of a snapshot apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyReport {
    /// Tables loaded.
    pub tables: usize,
    /// Rows loaded, as counted by the engine.
    pub rows: u64,
    /// Compressed bytes read from disk.
    pub bytes: u64,
    /// Sequences restored.
    pub sequences: usize,
}

/// Replays a snapshot directory into a target node.
pub struct SnapshotApplier {
    pool: PgPool,
    meta_pool: PgPool,
    snapshot_dir: PathBuf,
}

impl SnapshotApplier {
    /// Creates an applier over the target node's pool. The snapshot row
    /// is tracked on the same pool unless [`Self::with_meta_pool`]
    /// redirects it.
    pub fn new(pool: PgPool, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            meta_pool: pool.clone(),
            pool,
            snapshot_dir: snapshot_dir.into(),
        }
    }

    /// Tracks the snapshot row on a different pool, for applies where the
    /// row lives on the node that generated the snapshot.
    pub fn with_meta_pool(mut self, meta_pool: PgPool) -> Self {
        self.meta_pool = meta_pool;
        self
    }

    /// Verifies the snapshot, loads every table, and restores sequences.
    ///
    /// The snapshot row flips to `applying` once loading starts and to
    /// `applied` on success. A precondition rejection (bad checksum,
    /// populated target) leaves the row alone: the snapshot itself is
    /// still good.
    pub async fn apply(&self, cancel: &CancellationToken) -> Result<ApplyReport> {
        let manifest = verify_snapshot_strict(&self.snapshot_dir)?;
        self.check_targets_empty(&manifest).await?;

        self.set_status(manifest.snapshot_id, SnapshotStatus::Applying)
            .await?;
        let result = self.load(&manifest, cancel).await;
        if let Err(err) = &result {
            let status = if matches!(err, SnapshotError::Cancelled) {
                SnapshotStatus::Cancelled
            } else {
                SnapshotStatus::Failed
            };
            if let Err(e) =
                meta::set_snapshot_status(&self.meta_pool, manifest.snapshot_id, status, None)
                    .await
            {
                tracing::warn!(snapshot_id = %manifest.snapshot_id, error = %e, "failed to record snapshot status");
            }
        }
        result
    }

    async fn load(&self, manifest: &Manifest, cancel: &CancellationToken) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        for entry in &manifest.tables {
            if cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }
            let table = TableRef::new(entry.schema.clone(), entry.name.clone());
            let path = self.snapshot_dir.join(&entry.file);

            let stmt = format!("COPY {} FROM STDIN WITH (FORMAT csv)", table.quoted());
            let mut copy_in = self.pool.copy_in_raw(&stmt).await?;
            let mut reader = CompressedReader::open(&path, manifest.compression)?;
            let mut buf = vec![0u8; CHUNK];
            loop {
                if cancel.is_cancelled() {
                    copy_in.abort("apply cancelled").await?;
                    return Err(SnapshotError::Cancelled);
                }
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                report.bytes += n as u64;
                copy_in.send(&buf[..n]).await?;
            }
            let rows = copy_in.finish().await?;
            report.rows += rows;
            report.tables += 1;
            tracing::debug!(table = %table, rows, "table applied");
        }

        for seq in &manifest.sequences {
            // A sequence that never advanced exports as 0; setval would
            // reject it.
            if seq.value <= 0 {
                continue;
            }
            let qualified = format!("{}.{}", quote_ident(&seq.schema), quote_ident(&seq.name));
            sqlx::query("SELECT setval($1::regclass, $2, true)")
                .bind(&qualified)
                .bind(seq.value)
                .execute(&self.pool)
                .await?;
            report.sequences += 1;
        }

        self.set_status(manifest.snapshot_id, SnapshotStatus::Applied)
            .await?;
        tracing::info!(
            snapshot_id = %manifest.snapshot_id,
            tables = report.tables,
            rows = report.rows,
            sequences = report.sequences,
            "snapshot applied"
        );
        Ok(report)
    }

    /// Refuses to load over existing rows: a populated target would turn
    /// the COPY into a partial, unverifiable mix.
    async fn check_targets_empty(&self, manifest: &Manifest) -> Result<()> {
        let mut populated = Vec::new();
        for entry in &manifest.tables {
            let table = TableRef::new(entry.schema.clone(), entry.name.clone());
            let row = sqlx::query(&format!(
                "SELECT EXISTS (SELECT 1 FROM {} LIMIT 1) AS populated",
                table.quoted()
            ))
            .fetch_one(&self.pool)
            .await?;
            if row.get::<bool, _>("populated") {
                populated.push(table.to_string());
            }
        }
        if populated.is_empty() {
            Ok(())
        } else {
            Err(SnapshotError::TargetNotEmpty(populated))
        }
    }

    async fn set_status(&self, snapshot_id: Uuid, status: SnapshotStatus) -> Result<()> {
        meta::set_snapshot_status(&self.meta_pool, snapshot_id, status, None).await?;
        Ok(())
    }
}
