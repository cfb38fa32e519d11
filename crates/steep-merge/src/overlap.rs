//! Overlap analysis.
//!
//! For each table, both sides are reduced to `(pk, content_hash)` pairs:
//! the primary key rendered as text (composite keys joined with `|`) and
//! an md5 over every non-PK column value, computed engine-side so rows
//! never leave the node for analysis. The two maps are then classified
//! into the four overlap categories.

use std::collections::BTreeMap;

use sqlx::{PgPool, Row};
use steep_engine::TableRef;
use steep_engine::ident::quote_ident;

use crate::Result;
use crate::executor::TableInfo;

/// Overlap categories for one table.
#[derive(Debug, Clone, Default)]
pub struct OverlapAnalysis {
    /// PKs present on both sides with equal content hashes.
    pub matches: u64,
    /// PKs present on both sides with differing hashes, as
    /// `(pk, hash_a, hash_b)`.
    pub conflicts: Vec<(String, String, String)>,
    /// `(pk, hash)` present only on node A.
    pub local_only: Vec<(String, String)>,
    /// `(pk, hash)` present only on node B.
    pub remote_only: Vec<(String, String)>,
}

impl OverlapAnalysis {
    /// Number of conflicting PKs.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.len() as u64
    }

    /// Total rows examined across both sides (by distinct PK).
    pub fn distinct_keys(&self) -> u64 {
        self.matches
            + self.conflict_count()
            + self.local_only.len() as u64
            + self.remote_only.len() as u64
    }
}

/// Classifies two `(pk, hash)` maps into overlap categories.
pub fn classify(
    local: &BTreeMap<String, String>,
    remote: &BTreeMap<String, String>,
) -> OverlapAnalysis {
    let mut analysis = OverlapAnalysis::default();

    for (pk, local_hash) in local {
        match remote.get(pk) {
            Some(remote_hash) if remote_hash == local_hash => analysis.matches += 1,
            Some(remote_hash) => {
                analysis
                    .conflicts
                    .push((pk.clone(), local_hash.clone(), remote_hash.clone()));
            }
            None => analysis.local_only.push((pk.clone(), local_hash.clone())),
        }
    }
    for (pk, remote_hash) in remote {
        if !local.contains_key(pk) {
            analysis.remote_only.push((pk.clone(), remote_hash.clone()));
        }
    }
    analysis
}

/// Renders the PK expression used in overlap and transfer queries.
pub fn pk_expr(pk_columns: &[String]) -> String {
    let cols: Vec<String> = pk_columns
        .iter()
        .map(|c| format!("{}::text", quote_ident(c)))
        .collect();
    if cols.len() == 1 {
        cols.into_iter().next().unwrap_or_default()
    } else {
        format!("concat_ws('|', {})", cols.join(", "))
    }
}

/// Renders the content-hash expression over every non-PK column.
///
/// The hash covers column values in catalog order, so it is stable across
/// row insertion order; a PK-only table hashes to a constant.
pub fn hash_expr(info: &TableInfo) -> String {
    let non_pk: Vec<String> = info
        .columns
        .iter()
        .filter(|c| !info.pk_columns.contains(&c.name))
        .map(|c| quote_ident(&c.name))
        .collect();
    if non_pk.is_empty() {
        "''".to_string()
    } else {
        format!("md5(ROW({})::text)", non_pk.join(", "))
    }
}

/// Fetches `(pk, content_hash)` for every row of `table` on one node.
pub async fn fetch_row_hashes(
    pool: &PgPool,
    info: &TableInfo,
) -> Result<BTreeMap<String, String>> {
    let sql = format!(
        "SELECT {} AS pk, {} AS row_hash FROM {}",
        pk_expr(&info.pk_columns),
        hash_expr(info),
        info.table.quoted()
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("pk"), row.get::<String, _>("row_hash")))
        .collect())
}

/// Analyzes one table across both nodes.
pub async fn analyze_table(
    local: &PgPool,
    remote: &PgPool,
    info: &TableInfo,
) -> Result<OverlapAnalysis> {
    let local_rows = fetch_row_hashes(local, info).await?;
    let remote_rows = fetch_row_hashes(remote, info).await?;
    Ok(classify(&local_rows, &remote_rows))
}

#[cfg(test)]
mod tests {
    use steep_engine::catalog::ColumnMeta;

    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn classify_covers_all_categories() {
        let local = map(&[("1", "a1"), ("2", "a2"), ("4", "same")]);
        let remote = map(&[("1", "b1"), ("3", "b3"), ("4", "same")]);

        let analysis = classify(&local, &remote);
        assert_eq!(analysis.matches, 1);
        assert_eq!(
            analysis.conflicts,
            vec![("1".to_string(), "a1".to_string(), "b1".to_string())]
        );
        assert_eq!(
            analysis.local_only,
            vec![("2".to_string(), "a2".to_string())]
        );
        assert_eq!(
            analysis.remote_only,
            vec![("3".to_string(), "b3".to_string())]
        );
        assert_eq!(analysis.distinct_keys(), 4);
    }

    #[test]
    fn classify_empty_sides() {
        let populated = map(&[("1", "x")]);
        let empty = BTreeMap::new();

        let analysis = classify(&populated, &empty);
        assert_eq!(analysis.local_only, vec![("1".to_string(), "x".to_string())]);
        assert!(analysis.conflicts.is_empty());

        let analysis = classify(&empty, &populated);
        assert_eq!(
            analysis.remote_only,
            vec![("1".to_string(), "x".to_string())]
        );
    }

    fn info(pk: &[&str], cols: &[&str]) -> TableInfo {
        TableInfo {
            table: TableRef::new("public", "orders"),
            pk_columns: pk.iter().map(ToString::to_string).collect(),
            columns: cols
                .iter()
                .enumerate()
                .map(|(i, name)| ColumnMeta {
                    name: (*name).to_string(),
                    data_type: "text".to_string(),
                    default: None,
                    nullable: true,
                    ordinal: i as i32 + 1,
                })
                .collect(),
            column_types: cols
                .iter()
                .map(|name| ((*name).to_string(), "text".to_string()))
                .collect(),
        }
    }

    #[test]
    fn pk_expr_single_and_composite() {
        assert_eq!(pk_expr(&["id".to_string()]), "\"id\"::text");
        assert_eq!(
            pk_expr(&["region".to_string(), "id".to_string()]),
            "concat_ws('|', \"region\"::text, \"id\"::text)"
        );
    }

    #[test]
    fn hash_expr_excludes_pk_columns() {
        let i = info(&["id"], &["id", "status", "total"]);
        assert_eq!(hash_expr(&i), "md5(ROW(\"status\", \"total\")::text)");
    }

    #[test]
    fn hash_expr_pk_only_table_is_constant() {
        let i = info(&["id"], &["id"]);
        assert_eq!(hash_expr(&i), "''");
    }
}
