//! One scheduler tick: optional schema reconciliation, then per-table row
//! replication in dependency order.
//!
//! Per-table failures are recorded in the ledger and never abort the tick;
//! a failed dependency probe ends the tick and the next cron match retries.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::planner;
use crate::replicate;

use super::SyncEngine;

impl SyncEngine {
    pub(super) async fn run_tick(&self) {
        self.record_tick_start();

        if self.auto_schema_sync() {
            if let Err(err) = self.schema().sync_all().await {
                warn!("Schema sync warning: {err}");
            }
        }

        self.sync_all_tables().await;
    }

    async fn sync_all_tables(&self) {
        info!("Starting sync at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));

        let plan = match planner::dependency_plan(self.source()).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!("Error resolving table dependencies: {err}");
                return;
            }
        };
        info!(
            "Found {} tables to sync (ordered by FK dependencies)",
            plan.len()
        );

        for node in &plan {
            if !self.is_running() {
                break;
            }

            if node.references.is_empty() {
                info!(
                    "Syncing table: {} (level {}, no dependencies)",
                    node.name, node.level
                );
            } else {
                info!(
                    "Syncing table: {} (level {}, depends on {:?})",
                    node.name, node.level, node.references
                );
            }
            if node.circular {
                warn!(
                    "Table {} participates in a foreign-key cycle, syncing with caution",
                    node.name
                );
            }

            self.sync_table(&node.name).await;
        }

        info!("All tables sync completed");
    }

    /// Per-table procedure: watermark append, then update detection.
    async fn sync_table(&self, table: &str) {
        self.mark_syncing(table);
        let (mut watermark, last_sync_time) = self.table_checkpoint(table);
        let (batch_size, checksum_sync) = self.replication_settings();

        let pk = match catalog::primary_key(self.source(), table).await {
            Ok(Some(pk)) => pk,
            Ok(None) => {
                info!("Table {table} has no primary key, skipping");
                self.mark_skipped(table, "no primary key");
                return;
            }
            Err(err) => {
                warn!("Error getting primary key for {table}: {err}");
                self.mark_error(table, err.to_string());
                return;
            }
        };

        let has_updated_at = catalog::has_column(self.source(), table, "updated_at")
            .await
            .unwrap_or(false);

        // Phase A: append rows past the watermark
        while self.is_running() {
            let batch = match replicate::fetch_append_batch(
                self.source(),
                table,
                &pk,
                watermark,
                batch_size,
            )
            .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    warn!("Error fetching rows from {table}: {err}");
                    self.mark_error(table, err.to_string());
                    return;
                }
            };
            if batch.is_empty() {
                break;
            }
            let fetched = batch.len();

            let outcome = match replicate::upsert_rows(self.target(), table, &pk, &batch).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!("Error upserting rows into {table}: {err}");
                    self.mark_error(table, err.to_string());
                    return;
                }
            };
            if let Some(max_pk) = outcome.max_pk {
                watermark = watermark.max(max_pk);
            }
            self.record_progress(table, Some(watermark), outcome.rows);
            debug!("  new data batch: {} records", outcome.rows);

            if fetched < batch_size {
                break;
            }
        }

        // engine stopped mid-table: commit the partial watermark and return
        if !self.is_running() {
            self.mark_success(table, watermark);
            return;
        }

        // Phase B: update detection
        match (has_updated_at, last_sync_time) {
            (true, Some(since)) => {
                debug!(
                    "  checking {table} for records updated since {}",
                    since.format("%Y-%m-%d %H:%M:%S")
                );
                let updated =
                    match replicate::fetch_updated_since(self.source(), table, since).await {
                        Ok(updated) => updated,
                        Err(err) => {
                            warn!("Error fetching updated rows from {table}: {err}");
                            self.mark_error(table, err.to_string());
                            return;
                        }
                    };
                if !updated.is_empty() {
                    match replicate::upsert_rows(self.target(), table, &pk, &updated).await {
                        Ok(outcome) => {
                            self.record_progress(table, None, outcome.rows);
                            info!("  updated data: {} records synced", outcome.rows);
                        }
                        Err(err) => {
                            warn!("Error upserting updated rows into {table}: {err}");
                            self.mark_error(table, err.to_string());
                            return;
                        }
                    }
                }
            }
            _ if checksum_sync => {
                debug!("  checksum reconciliation for {table}");
                let changed = match replicate::fetch_changed_by_checksum(
                    self.source(),
                    self.target(),
                    table,
                    &pk,
                )
                .await
                {
                    Ok(changed) => changed,
                    Err(err) => {
                        warn!("Error fetching changed rows from {table}: {err}");
                        self.mark_error(table, err.to_string());
                        return;
                    }
                };
                if changed.is_empty() {
                    debug!("  no changed records found");
                } else {
                    match replicate::upsert_rows(self.target(), table, &pk, &changed).await {
                        Ok(outcome) => {
                            self.record_progress(table, None, outcome.rows);
                            info!("  changed data: {} records synced", outcome.rows);
                        }
                        Err(err) => {
                            warn!("Error upserting changed rows into {table}: {err}");
                            self.mark_error(table, err.to_string());
                            return;
                        }
                    }
                }
            }
            _ => {
                debug!("Checksum sync disabled, skipping update detection for {table}");
            }
        }

        self.mark_success(table, watermark);
        info!("Table {table} synced");
    }
}
