//! System catalog queries.
//!
//! Read-only lookups over `pg_catalog` and `information_schema`: user
//! tables and sizes, primary keys, foreign key edges, column metadata,
//! sequences, and a few instance-level capability probes.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use crate::error::{EngineError, Result};
use crate::ident::quote_ident;

/// Schemas never included in user-table enumeration.
const SYSTEM_SCHEMAS: &str = "('pg_catalog', 'information_schema', 'steep')";

/// A schema-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableRef {
    /// Schema name, unquoted.
    pub schema: String,
    /// Table name, unquoted.
    pub name: String,
}

impl TableRef {
    /// Creates a reference from unquoted parts.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parses `schema.table`; a bare `table` defaults to `public`.
    pub fn parse(qualified: &str) -> Result<Self> {
        match qualified.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
                if name.contains('.') {
                    return Err(EngineError::InvalidTableName(qualified.to_string()));
                }
                Ok(Self::new(schema, name))
            }
            None if !qualified.is_empty() => Ok(Self::new("public", qualified)),
            _ => Err(EngineError::InvalidTableName(qualified.to_string())),
        }
    }

    /// Quoted form safe to splice into SQL: `"schema"."table"`.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A user table together with its on-disk size.
#[derive(Debug, Clone)]
pub struct TableSize {
    /// The table.
    pub table: TableRef,
    /// Total relation size in bytes, indexes and toast included.
    pub size_bytes: u64,
}

/// One column of a table, as the information schema describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Declared data type.
    pub data_type: String,
    /// Column default expression, if any.
    pub default: Option<String>,
    /// Whether NULL is permitted.
    pub nullable: bool,
    /// 1-based position.
    pub ordinal: i32,
}

/// A foreign key edge: `child` references `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDep {
    /// Referencing table.
    pub child: TableRef,
    /// Referenced table.
    pub parent: TableRef,
}

/// A sequence and its last value.
#[derive(Debug, Clone)]
pub struct SequenceValue {
    /// Schema name.
    pub schema: String,
    /// Sequence name.
    pub name: String,
    /// Last value; zero when never advanced.
    pub value: i64,
}

/// Enumerates user tables with sizes, excluding system schemas and the
/// `steep` namespace, in catalog order.
pub async fn list_user_tables(pool: &PgPool) -> Result<Vec<TableSize>> {
    let rows = sqlx::query(&format!(
        "SELECT n.nspname AS schema, c.relname AS name, \
                pg_total_relation_size(c.oid) AS size_bytes \
         FROM pg_class c \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relkind = 'r' \
           AND n.nspname NOT IN {SYSTEM_SCHEMAS} \
           AND n.nspname NOT LIKE 'pg\\_%' \
         ORDER BY n.nspname, c.relname"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TableSize {
            table: TableRef::new(row.get::<String, _>("schema"), row.get::<String, _>("name")),
            size_bytes: row.get::<i64, _>("size_bytes").max(0) as u64,
        })
        .collect())
}

/// Returns the primary key columns of `table`, in key order.
///
/// Empty when the table has no primary key.
pub async fn primary_key_columns(pool: &PgPool, table: &TableRef) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT a.attname AS name \
         FROM pg_index i \
         JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
         WHERE i.indrelid = $1::regclass AND i.indisprimary \
         ORDER BY array_position(i.indkey, a.attnum)",
    )
    .bind(table.quoted())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.get("name")).collect())
}

/// Returns ordered column metadata for `table`.
pub async fn table_columns(pool: &PgPool, table: &TableRef) -> Result<Vec<ColumnMeta>> {
    let rows = sqlx::query(
        "SELECT column_name, data_type, column_default, \
                is_nullable = 'YES' AS nullable, ordinal_position \
         FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2 \
         ORDER BY ordinal_position",
    )
    .bind(&table.schema)
    .bind(&table.name)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ColumnMeta {
            name: row.get("column_name"),
            data_type: row.get("data_type"),
            default: row.get("column_default"),
            nullable: row.get("nullable"),
            ordinal: row.get("ordinal_position"),
        })
        .collect())
}

/// Returns `(column, type)` pairs for `table` in attribute order, with
/// type names rendered by the engine (`format_type`) so they are valid
/// cast targets. The information-schema `data_type` is not: arrays and
/// user-defined types come back as `ARRAY`/`USER-DEFINED`.
pub async fn column_types(pool: &PgPool, table: &TableRef) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query(
        "SELECT a.attname AS name, format_type(a.atttypid, a.atttypmod) AS sql_type \
         FROM pg_attribute a \
         WHERE a.attrelid = $1::regclass AND a.attnum > 0 AND NOT a.attisdropped \
         ORDER BY a.attnum",
    )
    .bind(table.quoted())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("name"), row.get("sql_type")))
        .collect())
}

/// Returns every foreign key edge between user tables.
pub async fn foreign_key_deps(pool: &PgPool) -> Result<Vec<ForeignKeyDep>> {
    let rows = sqlx::query(
        "SELECT cn.nspname AS child_schema, cc.relname AS child_table, \
                pn.nspname AS parent_schema, pc.relname AS parent_table \
         FROM pg_constraint con \
         JOIN pg_class cc ON cc.oid = con.conrelid \
         JOIN pg_namespace cn ON cn.oid = cc.relnamespace \
         JOIN pg_class pc ON pc.oid = con.confrelid \
         JOIN pg_namespace pn ON pn.oid = pc.relnamespace \
         WHERE con.contype = 'f'",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ForeignKeyDep {
            child: TableRef::new(
                row.get::<String, _>("child_schema"),
                row.get::<String, _>("child_table"),
            ),
            parent: TableRef::new(
                row.get::<String, _>("parent_schema"),
                row.get::<String, _>("parent_table"),
            ),
        })
        .collect())
}

/// Enumerates user sequences and their last values.
pub async fn list_sequences(pool: &PgPool) -> Result<Vec<SequenceValue>> {
    let rows = sqlx::query(&format!(
        "SELECT schemaname, sequencename, COALESCE(last_value, 0) AS last_value \
         FROM pg_sequences \
         WHERE schemaname NOT IN {SYSTEM_SCHEMAS} \
           AND schemaname NOT LIKE 'pg\\_%' \
         ORDER BY schemaname, sequencename"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SequenceValue {
            schema: row.get("schemaname"),
            name: row.get("sequencename"),
            value: row.get("last_value"),
        })
        .collect())
}

/// Exact row count of `table`.
pub async fn table_row_count(pool: &PgPool, table: &TableRef) -> Result<u64> {
    let row = sqlx::query(&format!("SELECT count(*) AS n FROM {}", table.quoted()))
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("n").max(0) as u64)
}

/// Whether the instance tracks commit timestamps.
///
/// Required by the `last-modified` merge strategy.
pub async fn commit_timestamps_enabled(pool: &PgPool) -> Result<bool> {
    let row = sqlx::query("SELECT current_setting('track_commit_timestamp') AS v")
        .fetch_one(pool)
        .await?;
    Ok(row.get::<String, _>("v") == "on")
}

/// Number of concurrently active client transactions, excluding our own.
pub async fn active_transaction_count(pool: &PgPool) -> Result<u64> {
    let row = sqlx::query(
        "SELECT count(*) AS n FROM pg_stat_activity \
         WHERE state = 'active' \
           AND backend_type = 'client backend' \
           AND pid <> pg_backend_pid()",
    )
    .fetch_one(pool)
    .await?;
    Ok(row.get::<i64, _>("n").max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ref_parse() {
        let t = TableRef::parse("public.orders").unwrap();
        assert_eq!(t.schema, "public");
        assert_eq!(t.name, "orders");

        let bare = TableRef::parse("orders").unwrap();
        assert_eq!(bare.schema, "public");

        assert!(TableRef::parse("").is_err());
        assert!(TableRef::parse(".orders").is_err());
        assert!(TableRef::parse("a.b.c").is_err());
    }

    #[test]
    fn table_ref_quoting() {
        let t = TableRef::new("public", "orders");
        assert_eq!(t.quoted(), "\"public\".\"orders\"");
        assert_eq!(t.to_string(), "public.orders");

        let odd = TableRef::new("we\"ird", "ta.ble");
        assert_eq!(odd.quoted(), "\"we\"\"ird\".\"ta.ble\"");
    }

    #[test]
    fn table_ref_ordering_is_deterministic() {
        let mut tables = vec![
            TableRef::new("public", "b"),
            TableRef::new("audit", "z"),
            TableRef::new("public", "a"),
        ];
        tables.sort();
        assert_eq!(tables[0], TableRef::new("audit", "z"));
        assert_eq!(tables[1], TableRef::new("public", "a"));
    }
}
