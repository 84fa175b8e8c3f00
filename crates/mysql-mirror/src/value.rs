//! Row and value model for replication.
//!
//! Result sets are carried as one shared, ordered column list plus per-row
//! value vectors, so that declaration order survives from fetch to upsert.
//! Checksum expressions are built over columns in declaration order, which
//! makes that ordering load-bearing.
//!
//! Driver values are converted once per fetched row into a small owned
//! variant enum keyed off the column's reported type.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// A scanned SQL value.
///
/// Raw byte columns are coerced to UTF-8 text at decode time so a value
/// compares equal to itself across fetch/upsert round trips under checksum
/// comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Coerce a primary-key value into the integer watermark domain.
    ///
    /// Integer types pass through; text keys are parsed as decimal integers;
    /// anything else leaves the watermark unchanged.
    #[must_use]
    pub fn as_watermark(&self) -> Option<i64> {
        match self {
            SqlValue::I64(v) => Some(*v),
            SqlValue::U64(v) => i64::try_from(*v).ok(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Hashable form used to join rows by primary key during checksum
    /// comparison. Floats and NULL do not qualify as keys.
    #[must_use]
    pub fn as_key(&self) -> Option<PkKey> {
        match self {
            SqlValue::Bool(v) => Some(PkKey::Int(i64::from(*v))),
            SqlValue::I64(v) => Some(PkKey::Int(*v)),
            SqlValue::U64(v) => Some(PkKey::Uint(*v)),
            SqlValue::Decimal(v) => Some(PkKey::Text(v.to_string())),
            SqlValue::Text(s) => Some(PkKey::Text(s.clone())),
            SqlValue::Date(v) => Some(PkKey::Text(v.to_string())),
            SqlValue::Time(v) => Some(PkKey::Text(v.to_string())),
            SqlValue::DateTime(v) => Some(PkKey::Text(v.to_string())),
            SqlValue::Null | SqlValue::F32(_) | SqlValue::F64(_) => None,
        }
    }
}

/// Hashable primary-key representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PkKey {
    Int(i64),
    Uint(u64),
    Text(String),
}

/// An ordered result set: one shared column list, many value rows.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    /// Get the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the set contains no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Remove a column from the set, e.g. a synthetic checksum column.
    pub fn drop_column(&mut self, name: &str) {
        if let Some(idx) = self.column_index(name) {
            self.columns.remove(idx);
            for row in &mut self.rows {
                if idx < row.len() {
                    row.remove(idx);
                }
            }
        }
    }

    /// Build a set from driver rows, decoding each value once.
    #[must_use]
    pub fn from_rows(rows: &[MySqlRow]) -> Self {
        let Some(first) = rows.first() else {
            return Self::default();
        };
        let columns: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();
        let decoded = rows.iter().map(decode_row).collect();
        Self {
            columns,
            rows: decoded,
        }
    }
}

/// Convert one driver row into owned values.
fn decode_row(row: &MySqlRow) -> Vec<SqlValue> {
    (0..row.columns().len()).map(|i| decode_value(row, i)).collect()
}

/// Decode a single column by its reported type name.
///
/// Unknown types fall back to string, then to lossy UTF-8 over raw bytes.
fn decode_value(row: &MySqlRow, idx: usize) -> SqlValue {
    let is_null: bool = row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true);
    if is_null {
        return SqlValue::Null;
    }

    let type_name = row.columns()[idx].type_info().name();
    match type_name {
        "BOOLEAN" => row
            .try_get::<bool, _>(idx)
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),

        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => row
            .try_get::<i64, _>(idx)
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null),

        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<u64, _>(idx)
            .map(SqlValue::U64)
            .unwrap_or(SqlValue::Null),

        "FLOAT" => row
            .try_get::<f32, _>(idx)
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null),

        "DOUBLE" => row
            .try_get::<f64, _>(idx)
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null),

        "DECIMAL" => row
            .try_get::<Decimal, _>(idx)
            .map(SqlValue::Decimal)
            .unwrap_or(SqlValue::Null),

        "DATE" => row
            .try_get::<NaiveDate, _>(idx)
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),

        "TIME" => row
            .try_get::<NaiveTime, _>(idx)
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null),

        "DATETIME" | "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null),

        // Raw byte types are coerced to UTF-8 text for stable round trips.
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|b| SqlValue::Text(String::from_utf8_lossy(&b).into_owned()))
            .unwrap_or(SqlValue::Null),

        // CHAR/VARCHAR/TEXT/ENUM/SET/JSON and anything else
        _ => row
            .try_get::<String, _>(idx)
            .map(SqlValue::Text)
            .or_else(|_| {
                row.try_get::<Vec<u8>, _>(idx)
                    .map(|b| SqlValue::Text(String::from_utf8_lossy(&b).into_owned()))
            })
            .unwrap_or(SqlValue::Null),
    }
}

/// Bind a value to a MySQL query.
pub(crate) fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::U64(v) => query.bind(*v),
        SqlValue::F32(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::Text(s) => query.bind(s.as_str()),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
        SqlValue::DateTime(v) => query.bind(*v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_coercion() {
        assert_eq!(SqlValue::I64(42).as_watermark(), Some(42));
        assert_eq!(SqlValue::U64(7).as_watermark(), Some(7));
        assert_eq!(SqlValue::Text("123".into()).as_watermark(), Some(123));
        assert_eq!(SqlValue::Text(" 9 ".into()).as_watermark(), Some(9));
        assert_eq!(SqlValue::Text("order-9".into()).as_watermark(), None);
        assert_eq!(SqlValue::F64(1.5).as_watermark(), None);
        assert_eq!(SqlValue::Null.as_watermark(), None);
    }

    #[test]
    fn test_watermark_rejects_oversized_unsigned() {
        assert_eq!(SqlValue::U64(u64::MAX).as_watermark(), None);
    }

    #[test]
    fn test_key_forms() {
        assert_eq!(SqlValue::I64(5).as_key(), Some(PkKey::Int(5)));
        assert_eq!(SqlValue::Bool(true).as_key(), Some(PkKey::Int(1)));
        assert_eq!(
            SqlValue::Text("abc".into()).as_key(),
            Some(PkKey::Text("abc".into()))
        );
        assert_eq!(SqlValue::Null.as_key(), None);
        assert_eq!(SqlValue::F32(1.0).as_key(), None);
    }

    #[test]
    fn test_column_index_is_case_insensitive() {
        let set = RowSet {
            columns: vec!["Id".into(), "Name".into()],
            rows: vec![],
        };
        assert_eq!(set.column_index("id"), Some(0));
        assert_eq!(set.column_index("NAME"), Some(1));
        assert_eq!(set.column_index("missing"), None);
    }

    #[test]
    fn test_drop_column_removes_values() {
        let mut set = RowSet {
            columns: vec!["id".into(), "name".into(), "row_checksum".into()],
            rows: vec![
                vec![SqlValue::I64(1), SqlValue::Text("a".into()), SqlValue::U64(10)],
                vec![SqlValue::I64(2), SqlValue::Text("b".into()), SqlValue::U64(20)],
            ],
        };
        set.drop_column("row_checksum");
        assert_eq!(set.columns, vec!["id".to_string(), "name".to_string()]);
        assert!(set.rows.iter().all(|r| r.len() == 2));
    }

    #[test]
    fn test_drop_missing_column_is_noop() {
        let mut set = RowSet {
            columns: vec!["id".into()],
            rows: vec![vec![SqlValue::I64(1)]],
        };
        set.drop_column("nope");
        assert_eq!(set.columns.len(), 1);
        assert_eq!(set.rows[0].len(), 1);
    }
}
