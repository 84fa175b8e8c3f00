//! Per-table and engine-level status reporting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Replication phase a table was last observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Syncing,
    Success,
    Error,
    Skipped,
}

/// Ledger record for one table.
///
/// Created lazily on the table's first encounter and mutated only through
/// the engine's guarded operations.
#[derive(Debug, Clone, Serialize)]
pub struct TableSyncStatus {
    pub table: String,

    /// High-watermark of the primary key; non-decreasing across ticks.
    pub last_sync_id: i64,

    /// Rows upserted since process start.
    pub total_synced: i64,

    /// Instant of the last successful sync, unset until the first one.
    pub last_sync_time: Option<DateTime<Utc>>,

    pub status: SyncPhase,

    /// Last error or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableSyncStatus {
    pub(crate) fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            last_sync_id: 0,
            total_synced: 0,
            last_sync_time: None,
            status: SyncPhase::Syncing,
            error: None,
        }
    }
}

/// Deep-copied engine snapshot returned by `get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub schedule: String,
    pub batch_size: usize,
    pub auto_schema_sync: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub tables: HashMap<String, TableSyncStatus>,
}
