//! Fingerprint diffing.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::PgPool;

use crate::transport::FingerprintTransport;
use crate::{Result, fingerprint};

/// Per-table comparison outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Fingerprints are identical.
    Match,
    /// Both sides have the table but fingerprints differ.
    Mismatch,
    /// Table exists only locally.
    LocalOnly,
    /// Table exists only on the remote.
    RemoteOnly,
}

/// One table's comparison result.
#[derive(Debug, Clone, Serialize)]
pub struct TableComparison {
    /// Qualified table name.
    pub table: String,
    /// Outcome.
    pub status: TableStatus,
    /// Local fingerprint, when present.
    pub local: Option<String>,
    /// Remote fingerprint, when present.
    pub remote: Option<String>,
}

/// Full comparison: per-table outcomes plus summary counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaComparison {
    /// Per-table outcomes, sorted by qualified name.
    pub tables: Vec<TableComparison>,
    /// Tables with identical fingerprints.
    pub matched: usize,
    /// Tables present on both sides with differing fingerprints.
    pub mismatched: usize,
    /// Tables present only locally.
    pub local_only: usize,
    /// Tables present only remotely.
    pub remote_only: usize,
}

impl SchemaComparison {
    /// True when every table matched on both sides.
    pub fn is_match(&self) -> bool {
        self.mismatched == 0 && self.local_only == 0 && self.remote_only == 0
    }

    /// Names of tables that did not match, for reporting.
    pub fn divergent_tables(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|t| t.status != TableStatus::Match)
            .map(|t| t.table.clone())
            .collect()
    }
}

/// Diffs two fingerprint maps with full-outer-join semantics.
pub fn compare_fingerprints(
    local: &BTreeMap<String, String>,
    remote: &BTreeMap<String, String>,
) -> SchemaComparison {
    let mut result = SchemaComparison::default();

    let mut names: Vec<&String> = local.keys().chain(remote.keys()).collect();
    names.sort();
    names.dedup();

    for name in names {
        let l = local.get(name);
        let r = remote.get(name);
        let status = match (l, r) {
            (Some(l), Some(r)) if l == r => TableStatus::Match,
            (Some(_), Some(_)) => TableStatus::Mismatch,
            (Some(_), None) => TableStatus::LocalOnly,
            (None, Some(_)) => TableStatus::RemoteOnly,
            (None, None) => unreachable!("name came from one of the maps"),
        };
        match status {
            TableStatus::Match => result.matched += 1,
            TableStatus::Mismatch => result.mismatched += 1,
            TableStatus::LocalOnly => result.local_only += 1,
            TableStatus::RemoteOnly => result.remote_only += 1,
        }
        result.tables.push(TableComparison {
            table: name.clone(),
            status,
            local: l.cloned(),
            remote: r.cloned(),
        });
    }
    result
}

/// Compares the local node's live fingerprints against a remote peer.
pub async fn compare(
    local_pool: &PgPool,
    remote: &dyn FingerprintTransport,
) -> Result<SchemaComparison> {
    let local = fingerprint::capture_live(local_pool).await?;
    let remote = remote.fetch_fingerprints().await?;
    Ok(compare_fingerprints(&local, &remote))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn identical_maps_match() {
        let fps = map(&[("public.orders", "sha256:aa"), ("public.users", "sha256:bb")]);
        let cmp = compare_fingerprints(&fps, &fps.clone());
        assert!(cmp.is_match());
        assert_eq!(cmp.matched, 2);
        assert!(cmp.divergent_tables().is_empty());
    }

    #[test]
    fn full_outer_join_categories() {
        let local = map(&[
            ("public.orders", "sha256:aa"),
            ("public.users", "sha256:bb"),
            ("public.local_scratch", "sha256:cc"),
        ]);
        let remote = map(&[
            ("public.orders", "sha256:aa"),
            ("public.users", "sha256:ZZ"),
            ("public.remote_scratch", "sha256:dd"),
        ]);

        let cmp = compare_fingerprints(&local, &remote);
        assert!(!cmp.is_match());
        assert_eq!(cmp.matched, 1);
        assert_eq!(cmp.mismatched, 1);
        assert_eq!(cmp.local_only, 1);
        assert_eq!(cmp.remote_only, 1);

        let divergent = cmp.divergent_tables();
        assert_eq!(
            divergent,
            vec![
                "public.local_scratch".to_string(),
                "public.remote_scratch".to_string(),
                "public.users".to_string(),
            ]
        );
    }

    #[test]
    fn empty_vs_empty_matches() {
        let cmp = compare_fingerprints(&BTreeMap::new(), &BTreeMap::new());
        assert!(cmp.is_match());
        assert!(cmp.tables.is_empty());
    }
}
