//! Source and target information catalog probes.
//!
//! All probes run against `information_schema` scoped to the connection's
//! default schema via `DATABASE()`, and carry a 10-second deadline. Catalog
//! strings are CAST to CHAR because `information_schema` may hand back
//! VARBINARY under some collations.

use std::time::Duration;

use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;

use crate::db::{quote_ident, with_deadline};
use crate::error::Result;

/// Deadline for every catalog query.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

/// A column as described by the information catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,

    /// Logical data type, e.g. `varchar`.
    pub data_type: String,

    /// Full type string including width and signedness, e.g. `varchar(20)`.
    pub column_type: String,

    pub is_nullable: bool,

    /// Key role: `PRI`, `UNI`, `MUL`, or empty.
    pub column_key: String,

    /// Default expression, if any.
    pub default: Option<String>,

    /// Extra qualifiers such as `auto_increment`.
    pub extra: String,
}

/// An outbound foreign-key edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyEdge {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub constraint: String,
}

/// List base-table names in the default schema, lexicographically.
/// Views are excluded.
pub async fn list_tables(pool: &MySqlPool) -> Result<Vec<String>> {
    let query = r#"
        SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    let rows: Vec<MySqlRow> = with_deadline(
        "listing tables",
        CATALOG_TIMEOUT,
        sqlx::query(query).fetch_all(pool),
    )
    .await?;

    Ok(rows
        .iter()
        .map(|row| row.get::<String, _>("TABLE_NAME"))
        .collect())
}

/// Column descriptors for a table, in declaration order.
pub async fn table_columns(pool: &MySqlPool, table: &str) -> Result<Vec<ColumnDescriptor>> {
    let query = r#"
        SELECT
            CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
            CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
            CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
            IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
            CAST(COLUMN_KEY AS CHAR(16)) AS COLUMN_KEY,
            CAST(COLUMN_DEFAULT AS CHAR(4000)) AS COLUMN_DEFAULT,
            CAST(EXTRA AS CHAR(255)) AS EXTRA
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    let rows: Vec<MySqlRow> = with_deadline(
        "loading columns",
        CATALOG_TIMEOUT,
        sqlx::query(query).bind(table).fetch_all(pool),
    )
    .await?;

    Ok(rows
        .iter()
        .map(|row| ColumnDescriptor {
            name: row.get("COLUMN_NAME"),
            data_type: row.get("DATA_TYPE"),
            column_type: row.get("COLUMN_TYPE"),
            is_nullable: row.get::<i32, _>("is_nullable") == 1,
            column_key: row.get("COLUMN_KEY"),
            default: row.get("COLUMN_DEFAULT"),
            extra: row.get("EXTRA"),
        })
        .collect())
}

/// Column names only, in declaration order.
pub async fn column_names(pool: &MySqlPool, table: &str) -> Result<Vec<String>> {
    let query = r#"
        SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    let rows: Vec<MySqlRow> = with_deadline(
        "loading column names",
        CATALOG_TIMEOUT,
        sqlx::query(query).bind(table).fetch_all(pool),
    )
    .await?;

    Ok(rows
        .iter()
        .map(|row| row.get::<String, _>("COLUMN_NAME"))
        .collect())
}

/// The single primary-key column of a table, or `None` if it has no
/// primary key. A composite key yields its first column in key order;
/// callers treat it as the whole key.
pub async fn primary_key(pool: &MySqlPool, table: &str) -> Result<Option<String>> {
    let query = r#"
        SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = DATABASE()
          AND TABLE_NAME = ?
          AND CONSTRAINT_NAME = 'PRIMARY'
        ORDER BY ORDINAL_POSITION
        LIMIT 1
    "#;

    let row: Option<MySqlRow> = with_deadline(
        "loading primary key",
        CATALOG_TIMEOUT,
        sqlx::query(query).bind(table).fetch_optional(pool),
    )
    .await?;

    Ok(row.map(|r| r.get::<String, _>("COLUMN_NAME")))
}

/// All outbound foreign-key edges of a table. Edges whose referenced table
/// is NULL are excluded by the catalog filter.
pub async fn foreign_keys(pool: &MySqlPool, table: &str) -> Result<Vec<ForeignKeyEdge>> {
    let query = r#"
        SELECT
            CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME,
            CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
            CAST(REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
            CAST(REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME,
            CAST(CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = DATABASE()
          AND TABLE_NAME = ?
          AND REFERENCED_TABLE_NAME IS NOT NULL
    "#;

    let rows: Vec<MySqlRow> = with_deadline(
        "loading foreign keys",
        CATALOG_TIMEOUT,
        sqlx::query(query).bind(table).fetch_all(pool),
    )
    .await?;

    Ok(rows
        .iter()
        .map(|row| ForeignKeyEdge {
            table: row.get("TABLE_NAME"),
            column: row.get("COLUMN_NAME"),
            referenced_table: row.get("REFERENCED_TABLE_NAME"),
            referenced_column: row.get("REFERENCED_COLUMN_NAME"),
            constraint: row.get("CONSTRAINT_NAME"),
        })
        .collect())
}

/// The dialect's canonical CREATE TABLE text for a table.
pub async fn create_statement(pool: &MySqlPool, table: &str) -> Result<String> {
    let query = format!("SHOW CREATE TABLE {}", quote_ident(table));

    let row: MySqlRow = with_deadline(
        "reading create statement",
        CATALOG_TIMEOUT,
        sqlx::query(&query).fetch_one(pool),
    )
    .await?;

    // SHOW CREATE TABLE returns (table name, create text)
    Ok(row.get::<String, _>(1))
}

/// Check if a table exists in the default schema.
pub async fn table_exists(pool: &MySqlPool, table: &str) -> Result<bool> {
    let query = r#"
        SELECT COUNT(*) AS cnt
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    "#;

    let row: MySqlRow = with_deadline(
        "checking table existence",
        CATALOG_TIMEOUT,
        sqlx::query(query).bind(table).fetch_one(pool),
    )
    .await?;

    Ok(row.get::<i64, _>("cnt") > 0)
}

/// Check if a table has a column with the given name.
pub async fn has_column(pool: &MySqlPool, table: &str, column: &str) -> Result<bool> {
    let query = r#"
        SELECT COUNT(*) AS cnt
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?
    "#;

    let row: MySqlRow = with_deadline(
        "checking column existence",
        CATALOG_TIMEOUT,
        sqlx::query(query).bind(table).bind(column).fetch_one(pool),
    )
    .await?;

    Ok(row.get::<i64, _>("cnt") > 0)
}
