//! The end-to-end merge protocol.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use steep_engine::catalog::{self, ColumnMeta};
use steep_engine::meta::{self, MergeAuditRow};
use steep_engine::{TableRef, ident};
use tokio_util::sync::CancellationToken;

use crate::config::MergeConfig;
use crate::error::{MergeError, Result};
use crate::overlap::{self, OverlapAnalysis, pk_expr};
use crate::quiesce::QuiesceSet;
use crate::report::{ConflictReport, MergeSummary, TableMergeReport};
use crate::strategy::{
    ConflictStrategy, Resolution, parse_timestamp, pick_last_modified, probe_timestamp_column,
};
use crate::{topo, transfer};

/// Everything the merge needs to know about one table.
#[derive(Debug, Clone)]
pub struct TableInfo {
    /// The table.
    pub table: TableRef,
    /// Primary key columns, in key order.
    pub pk_columns: Vec<String>,
    /// Information-schema column metadata.
    pub columns: Vec<ColumnMeta>,
    /// `(column, castable type)` pairs in attribute order.
    pub column_types: Vec<(String, String)>,
}

/// Runs merges between two populated nodes.
pub struct MergeExecutor {
    local: PgPool,
    remote: PgPool,
    config: MergeConfig,
}

impl MergeExecutor {
    /// Creates an executor over pools to both nodes.
    pub fn new(local: PgPool, remote: PgPool, config: MergeConfig) -> Self {
        Self {
            local,
            remote,
            config,
        }
    }

    /// Executes the merge protocol and returns the summary.
    ///
    /// Quiesce locks are released on every exit: the happy and error paths
    /// unlock explicitly, and dropping the lock set mid-cancellation
    /// closes its sessions, which frees the locks engine-side.
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<MergeSummary> {
        self.preflight().await?;

        let infos = self.resolve_tables().await?;
        let deps = catalog::foreign_key_deps(&self.local).await?;
        let order = topo::topo_sort(&self.config.tables, &deps)?;
        let ordered: Vec<&TableInfo> = order
            .iter()
            .filter_map(|t| infos.iter().find(|i| &i.table == t))
            .collect();

        let mut quiesce = QuiesceSet::connect(&self.local, &self.remote).await?;
        let result = self.run_locked(&mut quiesce, &ordered, cancel).await;
        let release = quiesce.release_all().await;

        let summary = result?;
        release?;
        Ok(summary)
    }

    async fn run_locked(
        &self,
        quiesce: &mut QuiesceSet,
        ordered: &[&TableInfo],
        cancel: &CancellationToken,
    ) -> Result<MergeSummary> {
        // Phase 1: quiesce and analyze every table, parents first.
        let mut analyses: Vec<OverlapAnalysis> = Vec::with_capacity(ordered.len());
        for info in ordered {
            if cancel.is_cancelled() {
                return Err(MergeError::Cancelled);
            }
            quiesce
                .acquire(&info.table, self.config.quiesce_timeout)
                .await?;
            let analysis = overlap::analyze_table(&self.local, &self.remote, info).await?;
            tracing::info!(
                table = %info.table,
                matches = analysis.matches,
                conflicts = analysis.conflict_count(),
                local_only = analysis.local_only.len(),
                remote_only = analysis.remote_only.len(),
                "overlap analyzed"
            );
            analyses.push(analysis);
        }

        let mut summary = MergeSummary {
            merge_id: self.config.merge_id,
            strategy: self.config.strategy,
            dry_run: self.config.dry_run,
            tables: ordered
                .iter()
                .zip(&analyses)
                .map(|(info, analysis)| TableMergeReport {
                    table: info.table.to_string(),
                    matches: analysis.matches,
                    conflicts: analysis.conflict_count(),
                    local_only: analysis.local_only.len() as u64,
                    remote_only: analysis.remote_only.len() as u64,
                    ..Default::default()
                })
                .collect(),
            conflict_reports: Vec::new(),
        };

        if self.config.dry_run {
            return Ok(summary);
        }

        // Phase 2: resolve and transfer, still in FK order.
        let MergeSummary {
            tables: table_reports,
            conflict_reports,
            ..
        } = &mut summary;
        for (idx, info) in ordered.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(MergeError::Cancelled);
            }
            let analysis = &analyses[idx];
            let report = &mut table_reports[idx];

            if self.config.strategy == ConflictStrategy::Manual && !analysis.conflicts.is_empty() {
                for (pk, hash_a, hash_b) in &analysis.conflicts {
                    conflict_reports.push(ConflictReport {
                        table: info.table.to_string(),
                        pk: pk.clone(),
                        node_a_hash: hash_a.clone(),
                        node_b_hash: hash_b.clone(),
                    });
                    self.audit(info, pk, "conflict", Resolution::Skipped, hash_a, hash_b)
                        .await?;
                    report.skipped += 1;
                }
            } else {
                for (pk, hash_a, hash_b) in &analysis.conflicts {
                    let resolution = self.resolve_conflict(info, pk).await?;
                    match resolution {
                        Resolution::KeptA => {
                            transfer::upsert_row(&self.local, &self.remote, info, pk).await?;
                        }
                        Resolution::KeptB => {
                            transfer::upsert_row(&self.remote, &self.local, info, pk).await?;
                        }
                        _ => {}
                    }
                    self.audit(info, pk, "conflict", resolution, hash_a, hash_b)
                        .await?;
                    report.resolved += 1;
                }
            }

            let a_to_b: Vec<String> =
                analysis.local_only.iter().map(|(pk, _)| pk.clone()).collect();
            report.transferred_a_to_b =
                transfer::transfer_rows(&self.local, &self.remote, info, &a_to_b).await?;
            for (pk, hash) in &analysis.local_only {
                self.audit(info, pk, "local_only", Resolution::TransferredAToB, hash, "")
                    .await?;
            }

            let b_to_a: Vec<String> =
                analysis.remote_only.iter().map(|(pk, _)| pk.clone()).collect();
            report.transferred_b_to_a =
                transfer::transfer_rows(&self.remote, &self.local, info, &b_to_a).await?;
            for (pk, hash) in &analysis.remote_only {
                self.audit(info, pk, "remote_only", Resolution::TransferredBToA, "", hash)
                    .await?;
            }

            tracing::info!(
                table = %info.table,
                resolved = report.resolved,
                skipped = report.skipped,
                a_to_b = report.transferred_a_to_b,
                b_to_a = report.transferred_b_to_a,
                "table merged"
            );
        }

        Ok(summary)
    }

    /// Strategy checks and environment warnings before any lock is taken.
    async fn preflight(&self) -> Result<()> {
        if self.config.strategy == ConflictStrategy::LastModified {
            for (node, pool) in [
                (&self.config.node_a, &self.local),
                (&self.config.node_b, &self.remote),
            ] {
                if !catalog::commit_timestamps_enabled(pool).await? {
                    return Err(MergeError::CommitTimestampsDisabled(node.to_string()));
                }
            }
        }

        for (node, pool) in [
            (&self.config.node_a, &self.local),
            (&self.config.node_b, &self.remote),
        ] {
            let active = catalog::active_transaction_count(pool).await?;
            if active > 0 {
                tracing::warn!(
                    node = %node,
                    active,
                    "concurrent transactions active; quiesce may contend"
                );
            }
        }
        Ok(())
    }

    /// Resolves PK and column metadata for every merge table; a table
    /// without a primary key cannot be merged.
    async fn resolve_tables(&self) -> Result<Vec<TableInfo>> {
        let mut infos = Vec::with_capacity(self.config.tables.len());
        for table in &self.config.tables {
            let pk_columns = catalog::primary_key_columns(&self.local, table).await?;
            if pk_columns.is_empty() {
                return Err(MergeError::MissingPrimaryKey(table.to_string()));
            }
            let columns = catalog::table_columns(&self.local, table).await?;
            let column_types = catalog::column_types(&self.local, table).await?;
            infos.push(TableInfo {
                table: table.clone(),
                pk_columns,
                columns,
                column_types,
            });
        }
        Ok(infos)
    }

    async fn resolve_conflict(&self, info: &TableInfo, pk: &str) -> Result<Resolution> {
        match self.config.strategy {
            ConflictStrategy::PreferNodeA => Ok(Resolution::KeptA),
            ConflictStrategy::PreferNodeB => Ok(Resolution::KeptB),
            ConflictStrategy::Manual => Ok(Resolution::Skipped),
            ConflictStrategy::LastModified => {
                let names: Vec<String> =
                    info.column_types.iter().map(|(n, _)| n.clone()).collect();
                let Some(ts_col) = probe_timestamp_column(&names) else {
                    return Ok(pick_last_modified(None, None));
                };
                let a = self.fetch_timestamp(&self.local, info, ts_col, pk).await?;
                let b = self.fetch_timestamp(&self.remote, info, ts_col, pk).await?;
                Ok(pick_last_modified(a, b))
            }
        }
    }

    async fn fetch_timestamp(
        &self,
        pool: &PgPool,
        info: &TableInfo,
        ts_col: &str,
        pk: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let sql = format!(
            "SELECT {}::text AS ts FROM {} WHERE {} = $1",
            ident::quote_ident(ts_col),
            info.table.quoted(),
            pk_expr(&info.pk_columns)
        );
        let row = sqlx::query(&sql).bind(pk).fetch_optional(pool).await?;
        Ok(row
            .and_then(|r| r.get::<Option<String>, _>("ts"))
            .and_then(|raw| parse_timestamp(&raw)))
    }

    async fn audit(
        &self,
        info: &TableInfo,
        pk: &str,
        category: &str,
        resolution: Resolution,
        value_a: &str,
        value_b: &str,
    ) -> Result<()> {
        let row = MergeAuditRow {
            merge_id: self.config.merge_id,
            schema: info.table.schema.clone(),
            table: info.table.name.clone(),
            pk_value: pk.to_string(),
            category: category.to_string(),
            resolution: resolution.as_str().to_string(),
            node_a_value: (!value_a.is_empty()).then(|| value_a.to_string()),
            node_b_value: (!value_b.is_empty()).then(|| value_b.to_string()),
        };
        meta::append_merge_audit(&self.local, &row).await?;
        Ok(())
    }
}
