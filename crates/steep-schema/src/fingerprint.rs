//! Fingerprint computation and capture.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use steep_engine::catalog::{self, ColumnMeta};
use steep_engine::meta::{self, FingerprintRow};
use steep_types::NodeId;

use crate::Result;

/// Field separator inside one tuple.
const FIELD_SEP: char = '\u{1f}';
/// Separator between tuples.
const ROW_SEP: char = '\u{1e}';

/// Computes the fingerprint of a table from its identity and column
/// metadata.
///
/// The schema and table name are hashed first, then each column sorted by
/// ordinal contributes `(name, type, default, nullability, ordinal)`
/// joined with a unit separator. The result is `sha256:<hex>` and changes
/// whenever the table is renamed or any of those attributes changes.
pub fn fingerprint_table(schema: &str, table: &str, columns: &[ColumnMeta]) -> String {
    let mut sorted: Vec<&ColumnMeta> = columns.iter().collect();
    sorted.sort_by_key(|c| c.ordinal);

    let mut hasher = Sha256::new();
    hasher.update(format!("{schema}{FIELD_SEP}{table}").as_bytes());
    for col in sorted {
        hasher.update([ROW_SEP as u8]);
        let tuple = format!(
            "{}{FIELD_SEP}{}{FIELD_SEP}{}{FIELD_SEP}{}{FIELD_SEP}{}",
            col.name,
            col.data_type,
            col.default.as_deref().unwrap_or(""),
            col.nullable,
            col.ordinal
        );
        hasher.update(tuple.as_bytes());
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Computes fingerprints for every user table without persisting them,
/// keyed by `schema.table`.
pub async fn capture_live(pool: &PgPool) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for entry in catalog::list_user_tables(pool).await? {
        let columns = catalog::table_columns(pool, &entry.table).await?;
        out.insert(
            entry.table.to_string(),
            fingerprint_table(&entry.table.schema, &entry.table.name, &columns),
        );
    }
    Ok(out)
}

/// Captures fingerprints for every user table and persists them under
/// `node` in the metadata store. Returns the number of tables captured.
pub async fn capture(pool: &PgPool, node: &NodeId) -> Result<usize> {
    let mut rows = Vec::new();
    for entry in catalog::list_user_tables(pool).await? {
        let columns = catalog::table_columns(pool, &entry.table).await?;
        rows.push(FingerprintRow {
            schema: entry.table.schema.clone(),
            table: entry.table.name.clone(),
            fingerprint: fingerprint_table(&entry.table.schema, &entry.table.name, &columns),
            column_count: columns.len() as u32,
        });
    }
    meta::upsert_fingerprints(pool, node, &rows).await?;
    tracing::debug!(node = %node, tables = rows.len(), "schema fingerprints captured");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn col(name: &str, data_type: &str, ordinal: i32) -> ColumnMeta {
        ColumnMeta {
            name: name.to_string(),
            data_type: data_type.to_string(),
            default: None,
            nullable: true,
            ordinal,
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let cols = vec![col("id", "integer", 1), col("name", "text", 2)];
        assert_eq!(
            fingerprint_table("public", "orders", &cols),
            fingerprint_table("public", "orders", &cols)
        );
        assert!(fingerprint_table("public", "orders", &cols).starts_with("sha256:"));
    }

    #[test]
    fn fingerprint_ignores_input_order() {
        let a = vec![col("id", "integer", 1), col("name", "text", 2)];
        let b = vec![col("name", "text", 2), col("id", "integer", 1)];
        assert_eq!(
            fingerprint_table("public", "orders", &a),
            fingerprint_table("public", "orders", &b)
        );
    }

    #[test]
    fn fingerprint_covers_table_identity() {
        let cols = vec![col("id", "integer", 1), col("name", "text", 2)];
        let reference = fingerprint_table("public", "orders", &cols);
        assert_ne!(fingerprint_table("public", "orders_archive", &cols), reference);
        assert_ne!(fingerprint_table("audit", "orders", &cols), reference);
    }

    #[test]
    fn fingerprint_changes_with_any_attribute() {
        let base = vec![col("id", "integer", 1), col("name", "text", 2)];
        let reference = fingerprint_table("public", "orders", &base);

        let mut renamed = base.clone();
        renamed[1].name = "title".to_string();
        assert_ne!(fingerprint_table("public", "orders", &renamed), reference);

        let mut retyped = base.clone();
        retyped[1].data_type = "varchar".to_string();
        assert_ne!(fingerprint_table("public", "orders", &retyped), reference);

        let mut defaulted = base.clone();
        defaulted[1].default = Some("''::text".to_string());
        assert_ne!(fingerprint_table("public", "orders", &defaulted), reference);

        let mut not_null = base.clone();
        not_null[1].nullable = false;
        assert_ne!(fingerprint_table("public", "orders", &not_null), reference);

        let mut reordered = base.clone();
        reordered[0].ordinal = 2;
        reordered[1].ordinal = 1;
        assert_ne!(fingerprint_table("public", "orders", &reordered), reference);
    }

    #[test]
    fn separator_prevents_field_bleed() {
        // "ab" + "c" must not collide with "a" + "bc"
        let a = vec![col("ab", "c", 1)];
        let b = vec![col("a", "bc", 1)];
        assert_ne!(
            fingerprint_table("public", "orders", &a),
            fingerprint_table("public", "orders", &b)
        );
        // Same guard on the identity prefix.
        assert_ne!(
            fingerprint_table("ab", "c", &a),
            fingerprint_table("a", "bc", &a)
        );
    }

    proptest! {
        #[test]
        fn shuffle_invariance(names in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
            let cols: Vec<ColumnMeta> = names
                .iter()
                .enumerate()
                .map(|(i, n)| col(n, "text", i as i32 + 1))
                .collect();
            let mut reversed = cols.clone();
            reversed.reverse();
            prop_assert_eq!(
                fingerprint_table("public", "t", &cols),
                fingerprint_table("public", "t", &reversed)
            );
        }
    }
}
