//! Row transfer between nodes.
//!
//! Small deltas move as individual parameterized inserts with
//! conflict-ignore; at or above [`BULK_THRESHOLD`] rows the COPY protocol
//! is used with an explicit catalog-ordered column list on both ends so
//! column-value alignment is stable. Either way the rows being moved do
//! not exist on the destination: the overlap analysis ran under quiesce
//! locks, so a conflict would mean the analysis was stale.

use futures::TryStreamExt;
use sqlx::postgres::PgPoolCopyExt;
use sqlx::{PgPool, Row};
use steep_engine::ident::{quote_ident, quote_literal};

use crate::Result;
use crate::executor::TableInfo;
use crate::overlap::pk_expr;

/// Row count at which transfers switch to the COPY protocol.
pub const BULK_THRESHOLD: usize = 100;

/// Moves the rows identified by `pks` from `source` to `dest`.
///
/// Returns the number of rows written.
pub async fn transfer_rows(
    source: &PgPool,
    dest: &PgPool,
    info: &TableInfo,
    pks: &[String],
) -> Result<u64> {
    if pks.is_empty() {
        return Ok(0);
    }
    if pks.len() < BULK_THRESHOLD {
        transfer_individual(source, dest, info, pks).await
    } else {
        transfer_bulk(source, dest, info, pks).await
    }
}

/// Writes the winning side's row over the losing side's, by PK.
pub async fn upsert_row(winner: &PgPool, loser: &PgPool, info: &TableInfo, pk: &str) -> Result<()> {
    let Some(values) = fetch_row_text(winner, info, pk).await? else {
        // Row vanished between analysis and resolution; nothing to write.
        tracing::warn!(table = %info.table, pk, "conflict row missing on winning side");
        return Ok(());
    };

    let columns = column_list(info);
    let placeholders = cast_placeholders(info);
    let pk_cols: Vec<String> = info
        .pk_columns
        .iter()
        .map(|c| quote_ident(c))
        .collect();
    let updates: Vec<String> = info
        .column_types
        .iter()
        .filter(|(name, _)| !info.pk_columns.contains(name))
        .map(|(name, _)| format!("{0} = EXCLUDED.{0}", quote_ident(name)))
        .collect();

    let sql = if updates.is_empty() {
        format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders}) ON CONFLICT ({}) DO NOTHING",
            info.table.quoted(),
            pk_cols.join(", ")
        )
    } else {
        format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders}) ON CONFLICT ({}) DO UPDATE SET {}",
            info.table.quoted(),
            pk_cols.join(", "),
            updates.join(", ")
        )
    };

    let mut query = sqlx::query(&sql);
    for value in &values {
        query = query.bind(value);
    }
    query.execute(loser).await?;
    Ok(())
}

async fn transfer_individual(
    source: &PgPool,
    dest: &PgPool,
    info: &TableInfo,
    pks: &[String],
) -> Result<u64> {
    let columns = column_list(info);
    let placeholders = cast_placeholders(info);
    let insert = format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders}) ON CONFLICT DO NOTHING",
        info.table.quoted()
    );

    let mut written = 0u64;
    for pk in pks {
        let Some(values) = fetch_row_text(source, info, pk).await? else {
            tracing::warn!(table = %info.table, pk, "transfer row missing on source");
            continue;
        };
        let mut query = sqlx::query(&insert);
        for value in &values {
            query = query.bind(value);
        }
        written += query.execute(dest).await?.rows_affected();
    }
    Ok(written)
}

async fn transfer_bulk(
    source: &PgPool,
    dest: &PgPool,
    info: &TableInfo,
    pks: &[String],
) -> Result<u64> {
    let columns = column_list(info);
    // COPY takes no bind parameters; the PK list is spliced as literals.
    let pk_array = pks
        .iter()
        .map(|pk| quote_literal(pk))
        .collect::<Vec<_>>()
        .join(", ");
    let out_stmt = format!(
        "COPY (SELECT {columns} FROM {} WHERE {} = ANY (ARRAY[{pk_array}])) \
         TO STDOUT WITH (FORMAT csv)",
        info.table.quoted(),
        pk_expr(&info.pk_columns),
    );
    let in_stmt = format!(
        "COPY {} ({columns}) FROM STDIN WITH (FORMAT csv)",
        info.table.quoted()
    );

    let mut out = source.copy_out_raw(&out_stmt).await?;
    let mut copy_in = dest.copy_in_raw(&in_stmt).await?;
    while let Some(chunk) = out.try_next().await? {
        copy_in.send(chunk).await?;
    }
    Ok(copy_in.finish().await?)
}

/// Fetches one row's columns as text, in catalog order.
async fn fetch_row_text(
    pool: &PgPool,
    info: &TableInfo,
    pk: &str,
) -> Result<Option<Vec<Option<String>>>> {
    let select_list: Vec<String> = info
        .column_types
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("{}::text AS c{i}", quote_ident(name)))
        .collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = $1",
        select_list.join(", "),
        info.table.quoted(),
        pk_expr(&info.pk_columns)
    );
    let row = sqlx::query(&sql).bind(pk).fetch_optional(pool).await?;
    Ok(row.map(|row| {
        (0..info.column_types.len())
            .map(|i| row.get::<Option<String>, _>(format!("c{i}").as_str()))
            .collect()
    }))
}

fn column_list(info: &TableInfo) -> String {
    info.column_types
        .iter()
        .map(|(name, _)| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Placeholders casting each bound text value back to its column type.
fn cast_placeholders(info: &TableInfo) -> String {
    info.column_types
        .iter()
        .enumerate()
        .map(|(i, (_, sql_type))| format!("${}::{sql_type}", i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use steep_engine::TableRef;
    use steep_engine::catalog::ColumnMeta;

    use super::*;

    fn info() -> TableInfo {
        TableInfo {
            table: TableRef::new("public", "orders"),
            pk_columns: vec!["id".to_string()],
            columns: vec![
                ColumnMeta {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
                    default: None,
                    nullable: false,
                    ordinal: 1,
                },
                ColumnMeta {
                    name: "status".to_string(),
                    data_type: "text".to_string(),
                    default: None,
                    nullable: true,
                    ordinal: 2,
                },
            ],
            column_types: vec![
                ("id".to_string(), "integer".to_string()),
                ("status".to_string(), "text".to_string()),
            ],
        }
    }

    #[test]
    fn placeholders_cast_to_column_types() {
        assert_eq!(cast_placeholders(&info()), "$1::integer, $2::text");
    }

    #[test]
    fn column_list_is_quoted_and_ordered() {
        assert_eq!(column_list(&info()), "\"id\", \"status\"");
    }
}
