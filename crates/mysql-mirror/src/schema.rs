//! Target schema reconciliation.
//!
//! Missing tables are created on the target from the source's own
//! `SHOW CREATE TABLE` text. Existing tables receive an additive diff:
//! columns the target lacks are added, columns whose definition drifted are
//! modified in place. Columns present only on the target are left alone,
//! and index, constraint, and FK changes on existing tables are out of
//! scope.

use std::collections::HashMap;
use std::time::Duration;

use sqlx::mysql::MySqlPool;
use tracing::{debug, info, warn};

use crate::catalog::{self, ColumnDescriptor};
use crate::db::{quote_ident, with_deadline};
use crate::error::{Result, SyncError};
use crate::planner;

/// Deadline for each DDL statement.
const DDL_TIMEOUT: Duration = Duration::from_secs(30);

/// Converges the target schema toward the source schema.
pub struct SchemaReconciler {
    source: MySqlPool,
    target: MySqlPool,
}

impl SchemaReconciler {
    pub fn new(source: MySqlPool, target: MySqlPool) -> Self {
        Self { source, target }
    }

    /// Reconcile every table, parents before children. A per-table failure
    /// is logged and the traversal continues.
    pub async fn sync_all(&self) -> Result<()> {
        info!("Starting schema synchronization");

        let plan = planner::dependency_plan(&self.source).await?;
        info!("Reconciling {} tables in dependency order", plan.len());

        for node in &plan {
            if let Err(err) = self.sync_table(&node.name).await {
                warn!("schema sync failed for table {}: {err}", node.name);
            }
        }

        info!("Schema synchronization completed");
        Ok(())
    }

    /// Bring one target table in line with its source counterpart.
    pub async fn sync_table(&self, table: &str) -> Result<()> {
        if !catalog::table_exists(&self.target, table).await? {
            return self.create_table(table).await;
        }

        let statements = self.diff_table(table).await?;
        if statements.is_empty() {
            debug!("schema already in sync for table {table}");
            return Ok(());
        }

        info!(
            "Applying {} schema changes to table {table}",
            statements.len()
        );
        for statement in &statements {
            debug!("executing: {statement}");
            with_deadline(
                "applying schema change",
                DDL_TIMEOUT,
                sqlx::query(statement).execute(&self.target),
            )
            .await
            .map_err(|err| SyncError::schema(table, err.to_string()))?;
        }

        Ok(())
    }

    /// Ordered ALTER statements needed to converge the target table.
    pub async fn diff_table(&self, table: &str) -> Result<Vec<String>> {
        let source_columns = catalog::table_columns(&self.source, table).await?;
        let target_columns = catalog::table_columns(&self.target, table).await?;
        Ok(diff_columns(table, &source_columns, &target_columns))
    }

    /// Replay the source's CREATE TABLE text verbatim on the target.
    async fn create_table(&self, table: &str) -> Result<()> {
        info!("Creating table {table} on target");

        let ddl = catalog::create_statement(&self.source, table).await?;
        with_deadline(
            "creating table",
            DDL_TIMEOUT,
            sqlx::query(&ddl).execute(&self.target),
        )
        .await
        .map_err(|err| SyncError::schema(table, err.to_string()))?;

        info!("Table created: {table}");
        Ok(())
    }
}

/// Compute the additive/modifying column diff.
fn diff_columns(
    table: &str,
    source: &[ColumnDescriptor],
    target: &[ColumnDescriptor],
) -> Vec<String> {
    let target_by_name: HashMap<&str, &ColumnDescriptor> =
        target.iter().map(|col| (col.name.as_str(), col)).collect();

    let mut statements = Vec::new();
    for column in source {
        match target_by_name.get(column.name.as_str()) {
            None => statements.push(column_statement(table, column, "ADD")),
            Some(existing) if columns_different(column, existing) => {
                statements.push(column_statement(table, column, "MODIFY"));
            }
            Some(_) => {}
        }
    }
    statements
}

/// Two columns differ iff their full type string, nullability, or extra
/// qualifiers differ. Defaults and key roles are not compared.
fn columns_different(a: &ColumnDescriptor, b: &ColumnDescriptor) -> bool {
    a.column_type != b.column_type || a.is_nullable != b.is_nullable || a.extra != b.extra
}

fn column_statement(table: &str, column: &ColumnDescriptor, verb: &str) -> String {
    let mut parts = vec![format!(
        "ALTER TABLE {} {verb} COLUMN {} {}",
        quote_ident(table),
        quote_ident(&column.name),
        column.column_type
    )];

    if !column.is_nullable {
        parts.push("NOT NULL".to_string());
    }
    if let Some(default) = &column.default {
        parts.push(format!("DEFAULT {default}"));
    }
    if !column.extra.is_empty() {
        parts.push(column.extra.clone());
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, column_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            data_type: column_type
                .split('(')
                .next()
                .unwrap_or(column_type)
                .to_string(),
            column_type: column_type.to_string(),
            is_nullable: true,
            column_key: String::new(),
            default: None,
            extra: String::new(),
        }
    }

    #[test]
    fn test_identical_columns_produce_no_statements() {
        let cols = vec![column("id", "int"), column("name", "varchar(255)")];
        assert!(diff_columns("items", &cols, &cols).is_empty());
    }

    #[test]
    fn test_missing_column_is_added() {
        let mut phone = column("phone", "varchar(20)");
        phone.is_nullable = false;
        phone.default = Some("''".to_string());

        let source = vec![column("id", "int"), phone];
        let target = vec![column("id", "int")];

        let statements = diff_columns("customers", &source, &target);
        assert_eq!(
            statements,
            vec!["ALTER TABLE `customers` ADD COLUMN `phone` varchar(20) NOT NULL DEFAULT ''"]
        );
    }

    #[test]
    fn test_type_drift_is_modified() {
        let source = vec![column("name", "varchar(500)")];
        let target = vec![column("name", "varchar(255)")];

        let statements = diff_columns("items", &source, &target);
        assert_eq!(
            statements,
            vec!["ALTER TABLE `items` MODIFY COLUMN `name` varchar(500)"]
        );
    }

    #[test]
    fn test_nullability_drift_is_modified() {
        let mut source_col = column("name", "varchar(255)");
        source_col.is_nullable = false;
        let target_col = column("name", "varchar(255)");

        let statements = diff_columns("items", &[source_col], &[target_col]);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("MODIFY COLUMN"));
        assert!(statements[0].ends_with("NOT NULL"));
    }

    #[test]
    fn test_extra_qualifier_drift_is_modified() {
        let mut source_col = column("id", "bigint");
        source_col.extra = "auto_increment".to_string();
        let target_col = column("id", "bigint");

        let statements = diff_columns("items", &[source_col], &[target_col]);
        assert_eq!(
            statements,
            vec!["ALTER TABLE `items` MODIFY COLUMN `id` bigint auto_increment"]
        );
    }

    #[test]
    fn test_default_drift_alone_is_ignored() {
        let mut source_col = column("created_at", "timestamp");
        source_col.default = Some("CURRENT_TIMESTAMP".to_string());
        let target_col = column("created_at", "timestamp");

        assert!(!columns_different(&source_col, &target_col));
        assert!(diff_columns("items", &[source_col], &[target_col]).is_empty());
    }

    #[test]
    fn test_key_role_drift_alone_is_ignored() {
        let mut source_col = column("code", "varchar(32)");
        source_col.column_key = "UNI".to_string();
        let target_col = column("code", "varchar(32)");

        assert!(!columns_different(&source_col, &target_col));
    }

    #[test]
    fn test_target_only_columns_are_left_alone() {
        let source = vec![column("id", "int")];
        let target = vec![column("id", "int"), column("legacy", "text")];
        assert!(diff_columns("items", &source, &target).is_empty());
    }

    #[test]
    fn test_statements_follow_source_column_order() {
        let source = vec![
            column("a", "int"),
            column("b", "int"),
            column("c", "int"),
        ];
        let target = vec![column("b", "int")];

        let statements = diff_columns("items", &source, &target);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("`a`"));
        assert!(statements[1].contains("`c`"));
    }
}
