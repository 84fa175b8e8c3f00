//! # mysql-mirror
//!
//! One-way MySQL replication on a cron schedule.
//!
//! The engine continuously mirrors a source database into a target of the
//! same dialect:
//!
//! - **FK-aware ordering**: tables are processed parents-first, derived
//!   from the live foreign-key graph; cycles are flagged and tolerated
//! - **Schema convergence**: missing tables are created from the source's
//!   `SHOW CREATE TABLE` text, drifted columns receive additive ALTERs
//! - **Three change-detection regimes**: primary-key watermark append,
//!   `updated_at` timestamp deltas, and CRC32 whole-table reconciliation
//! - **Control facade**: thread-safe start/stop/status/reconfigure plus a
//!   forced schema resync, the contract an HTTP layer consumes
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_mirror::{db, AppConfig, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> mysql_mirror::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let source = db::connect(&config.source, "source").await?;
//!     let target = db::connect(&config.target, "target").await?;
//!
//!     let engine = SyncEngine::new(source, target, config.sync);
//!     engine.start_sync().await?;
//!     // ... serve the control plane ...
//!     engine.stop_sync().await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod planner;
mod replicate;
pub mod schema;
pub mod status;
pub mod value;

// Re-exports for convenient access
pub use config::{AppConfig, DatabaseConfig, SyncConfig};
pub use engine::{parse_schedule, SyncEngine};
pub use error::{Result, SyncError};
pub use planner::TableNode;
pub use schema::SchemaReconciler;
pub use status::{EngineStatus, SyncPhase, TableSyncStatus};
pub use value::{RowSet, SqlValue};
