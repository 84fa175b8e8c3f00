//! Row movement between source and target.
//!
//! Three fetch shapes feed one upsert path: watermark append, timestamp
//! deltas, and CRC32 full-table reconciliation. Every statement runs under
//! a 60-second deadline.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlPool;
use tracing::debug;

use crate::catalog;
use crate::db::{quote_ident, with_deadline};
use crate::error::{Result, SyncError};
use crate::value::{bind_value, PkKey, RowSet, SqlValue};

/// Deadline for row fetches, upsert batches, and checksum scans.
const ROW_TIMEOUT: Duration = Duration::from_secs(60);

/// Cap on rows considered per tick when following `updated_at`.
const UPDATE_FETCH_LIMIT: u32 = 1000;

/// Synthetic column carrying the per-row CRC32 during reconciliation.
const CHECKSUM_COLUMN: &str = "row_checksum";

/// Outcome of one upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct UpsertOutcome {
    /// Rows written.
    pub rows: usize,
    /// Largest integer-coercible primary-key value seen in the batch.
    pub max_pk: Option<i64>,
}

/// Fetch the next watermark-append batch, ordered ascending by primary key.
pub(crate) async fn fetch_append_batch(
    pool: &MySqlPool,
    table: &str,
    pk: &str,
    watermark: i64,
    limit: usize,
) -> Result<RowSet> {
    let query = append_query(table, pk, watermark == 0);

    let rows = with_deadline(
        "fetching new rows",
        ROW_TIMEOUT,
        sqlx::query(&query)
            .bind(watermark)
            .bind(limit as u64)
            .fetch_all(pool),
    )
    .await?;

    Ok(RowSet::from_rows(&rows))
}

/// Fetch rows whose `updated_at` moved past the last successful sync.
pub(crate) async fn fetch_updated_since(
    pool: &MySqlPool,
    table: &str,
    since: DateTime<Utc>,
) -> Result<RowSet> {
    let query = updated_query(table);

    let rows = with_deadline(
        "fetching updated rows",
        ROW_TIMEOUT,
        sqlx::query(&query).bind(since.naive_utc()).fetch_all(pool),
    )
    .await?;

    Ok(RowSet::from_rows(&rows))
}

/// Upsert every row keyed on the primary-key column.
///
/// The whole batch shares one deadline; each row is a single parameterized
/// statement.
pub(crate) async fn upsert_rows(
    pool: &MySqlPool,
    table: &str,
    pk: &str,
    set: &RowSet,
) -> Result<UpsertOutcome> {
    if set.is_empty() {
        return Ok(UpsertOutcome::default());
    }

    let statement = upsert_statement(table, pk, &set.columns);
    let pk_idx = set.column_index(pk);

    with_deadline("upserting rows", ROW_TIMEOUT, async {
        let mut outcome = UpsertOutcome::default();
        for row in &set.rows {
            let mut query = sqlx::query(&statement);
            for value in row {
                query = bind_value(query, value);
            }
            query.execute(pool).await?;

            outcome.rows += 1;
            if let Some(idx) = pk_idx {
                if let Some(value) = row.get(idx).and_then(SqlValue::as_watermark) {
                    outcome.max_pk = Some(outcome.max_pk.map_or(value, |max| max.max(value)));
                }
            }
        }
        Ok::<_, sqlx::Error>(outcome)
    })
    .await
}

/// Rows whose CRC32 fingerprint differs between source and target, plus
/// source rows the target lacks. A missing target table yields the whole
/// source set.
pub(crate) async fn fetch_changed_by_checksum(
    source: &MySqlPool,
    target: &MySqlPool,
    table: &str,
    pk: &str,
) -> Result<RowSet> {
    let columns = catalog::column_names(source, table).await?;
    let query = checksum_query(table, pk, &columns);

    let source_rows = with_deadline(
        "scanning source checksums",
        ROW_TIMEOUT,
        sqlx::query(&query).fetch_all(source),
    )
    .await?;
    let mut source_set = RowSet::from_rows(&source_rows);

    let target_rows = match with_deadline(
        "scanning target checksums",
        ROW_TIMEOUT,
        sqlx::query(&query).fetch_all(target),
    )
    .await
    {
        Ok(rows) => rows,
        Err(err) if is_missing_table(&err) => {
            // no table on the target yet: replicate everything
            debug!("table {table} missing on target, copying all rows");
            source_set.drop_column(CHECKSUM_COLUMN);
            return Ok(source_set);
        }
        Err(err) => return Err(err),
    };
    let target_set = RowSet::from_rows(&target_rows);

    Ok(diff_by_checksum(&source_set, &target_set, pk))
}

fn is_missing_table(err: &SyncError) -> bool {
    matches!(
        err,
        SyncError::Database(sqlx::Error::Database(db_err))
            if db_err.message().contains("doesn't exist")
    )
}

fn append_query(table: &str, pk: &str, include_watermark: bool) -> String {
    // >= on a zero watermark so a row at pk = 0 is picked up on the first pass
    let operator = if include_watermark { ">=" } else { ">" };
    format!(
        "SELECT * FROM {table} WHERE {pk} {operator} ? ORDER BY {pk} LIMIT ?",
        table = quote_ident(table),
        pk = quote_ident(pk),
    )
}

fn updated_query(table: &str) -> String {
    format!(
        "SELECT * FROM {table} WHERE `updated_at` > ? ORDER BY `updated_at` LIMIT {UPDATE_FETCH_LIMIT}",
        table = quote_ident(table),
    )
}

/// INSERT ... ON DUPLICATE KEY UPDATE over every non-key column. A table
/// whose only column is the key degrades to INSERT IGNORE.
fn upsert_statement(table: &str, pk: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates = columns
        .iter()
        .filter(|c| c.as_str() != pk)
        .map(|c| format!("{0} = VALUES({0})", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");

    if updates.is_empty() {
        format!(
            "INSERT IGNORE INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list,
            placeholders
        )
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
            quote_ident(table),
            column_list,
            placeholders,
            updates
        )
    }
}

/// `SELECT *` plus a per-row CRC32 over all columns in declaration order.
/// COALESCE and the `|` separator keep NULLs and adjacent columns from
/// aliasing.
fn checksum_query(table: &str, pk: &str, columns: &[String]) -> String {
    let concat = columns
        .iter()
        .map(|c| format!("COALESCE({}, '')", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT *, CRC32(CONCAT_WS('|', {concat})) AS {CHECKSUM_COLUMN} FROM {table} ORDER BY {pk}",
        table = quote_ident(table),
        pk = quote_ident(pk),
    )
}

/// Join source and target by primary key and keep source rows that are
/// missing from the target or whose checksum differs. The synthetic
/// checksum column is stripped from the result.
fn diff_by_checksum(source: &RowSet, target: &RowSet, pk: &str) -> RowSet {
    let (Some(source_pk), Some(source_sum)) =
        (source.column_index(pk), source.column_index(CHECKSUM_COLUMN))
    else {
        return RowSet::default();
    };

    let mut target_sums: HashMap<PkKey, SqlValue> = HashMap::new();
    if let (Some(target_pk), Some(target_sum)) =
        (target.column_index(pk), target.column_index(CHECKSUM_COLUMN))
    {
        for row in &target.rows {
            if let Some(key) = row.get(target_pk).and_then(SqlValue::as_key) {
                if let Some(sum) = row.get(target_sum) {
                    target_sums.insert(key, sum.clone());
                }
            }
        }
    }

    let mut changed = RowSet {
        columns: source.columns.clone(),
        rows: Vec::new(),
    };
    for row in &source.rows {
        let Some(key) = row.get(source_pk).and_then(SqlValue::as_key) else {
            continue;
        };
        let replicate = match target_sums.get(&key) {
            None => true,
            Some(sum) => row.get(source_sum) != Some(sum),
        };
        if replicate {
            changed.rows.push(row.clone());
        }
    }

    changed.drop_column(CHECKSUM_COLUMN);
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_query_uses_inclusive_comparison_at_zero() {
        assert_eq!(
            append_query("items", "id", true),
            "SELECT * FROM `items` WHERE `id` >= ? ORDER BY `id` LIMIT ?"
        );
        assert_eq!(
            append_query("items", "id", false),
            "SELECT * FROM `items` WHERE `id` > ? ORDER BY `id` LIMIT ?"
        );
    }

    #[test]
    fn test_updated_query_caps_rows() {
        assert_eq!(
            updated_query("orders"),
            "SELECT * FROM `orders` WHERE `updated_at` > ? ORDER BY `updated_at` LIMIT 1000"
        );
    }

    #[test]
    fn test_upsert_statement_updates_non_key_columns() {
        let columns = vec!["id".to_string(), "name".to_string(), "qty".to_string()];
        assert_eq!(
            upsert_statement("items", "id", &columns),
            "INSERT INTO `items` (`id`, `name`, `qty`) VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE `name` = VALUES(`name`), `qty` = VALUES(`qty`)"
        );
    }

    #[test]
    fn test_upsert_statement_key_only_table() {
        let columns = vec!["id".to_string()];
        assert_eq!(
            upsert_statement("tags", "id", &columns),
            "INSERT IGNORE INTO `tags` (`id`) VALUES (?)"
        );
    }

    #[test]
    fn test_checksum_query_shape() {
        let columns = vec!["id".to_string(), "name".to_string()];
        assert_eq!(
            checksum_query("items", "id", &columns),
            "SELECT *, CRC32(CONCAT_WS('|', COALESCE(`id`, ''), COALESCE(`name`, ''))) \
             AS row_checksum FROM `items` ORDER BY `id`"
        );
    }

    fn set(rows: Vec<Vec<SqlValue>>) -> RowSet {
        RowSet {
            columns: vec![
                "id".to_string(),
                "name".to_string(),
                "row_checksum".to_string(),
            ],
            rows,
        }
    }

    fn row(id: i64, name: &str, sum: u64) -> Vec<SqlValue> {
        vec![
            SqlValue::I64(id),
            SqlValue::Text(name.to_string()),
            SqlValue::U64(sum),
        ]
    }

    #[test]
    fn test_diff_detects_changed_row() {
        let source = set(vec![row(1, "A", 111), row(2, "b", 222)]);
        let target = set(vec![row(1, "a", 100), row(2, "b", 222)]);

        let changed = diff_by_checksum(&source, &target, "id");
        assert_eq!(changed.rows.len(), 1);
        assert_eq!(changed.columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(
            changed.rows[0],
            vec![SqlValue::I64(1), SqlValue::Text("A".to_string())]
        );
    }

    #[test]
    fn test_diff_detects_missing_target_row() {
        let source = set(vec![row(1, "a", 111), row(2, "b", 222)]);
        let target = set(vec![row(1, "a", 111)]);

        let changed = diff_by_checksum(&source, &target, "id");
        assert_eq!(changed.rows.len(), 1);
        assert_eq!(changed.rows[0][0], SqlValue::I64(2));
    }

    #[test]
    fn test_diff_of_identical_sets_is_empty() {
        let source = set(vec![row(1, "a", 111), row(2, "b", 222)]);
        let changed = diff_by_checksum(&source, &source.clone(), "id");
        assert!(changed.is_empty());
    }

    #[test]
    fn test_diff_against_empty_target_copies_everything() {
        let source = set(vec![row(1, "a", 111), row(2, "b", 222)]);
        let target = RowSet::default();

        let changed = diff_by_checksum(&source, &target, "id");
        assert_eq!(changed.rows.len(), 2);
        assert!(changed.column_index("row_checksum").is_none());
    }

    #[test]
    fn test_upsert_outcome_default_is_empty() {
        let outcome = UpsertOutcome::default();
        assert_eq!(outcome.rows, 0);
        assert_eq!(outcome.max_pk, None);
    }
}
