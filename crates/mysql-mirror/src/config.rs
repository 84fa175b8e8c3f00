//! Environment-driven configuration for the hosting process.

use std::fmt;

use crate::error::{Result, SyncError};

/// Complete host configuration: sync behavior plus the two endpoints.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub source: DatabaseConfig,
    pub target: DatabaseConfig,
}

/// Synchronization behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cron expression driving ticks.
    pub schedule: String,

    /// Rows per watermark-append fetch.
    pub batch_size: usize,

    /// Run the schema reconciler at the start of every tick.
    pub auto_schema_sync: bool,

    /// Fall back to CRC32 reconciliation for tables without `updated_at`.
    pub enable_checksum_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schedule: "*/1 * * * *".to_string(),
            batch_size: 100,
            auto_schema_sync: true,
            enable_checksum_sync: true,
        }
    }
}

/// One database endpoint.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// Sync settings come from `SYNC_*`, endpoints from `SOURCE_DB_*` and
    /// `TARGET_DB_*`. Unset variables fall back to defaults; the database
    /// names are required.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            sync: SyncConfig::from_env()?,
            source: DatabaseConfig::from_env("SOURCE_DB_")?,
            target: DatabaseConfig::from_env("TARGET_DB_")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 {
            return Err(SyncError::Config(
                "SYNC_BATCH_SIZE must be a positive integer".to_string(),
            ));
        }
        crate::engine::parse_schedule(&self.sync.schedule)?;
        Ok(())
    }
}

impl SyncConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            schedule: env_string("SYNC_SCHEDULE", &defaults.schedule),
            batch_size: env_parse("SYNC_BATCH_SIZE", defaults.batch_size)?,
            auto_schema_sync: env_bool("SYNC_AUTO_SCHEMA_SYNC", defaults.auto_schema_sync)?,
            enable_checksum_sync: env_bool(
                "SYNC_ENABLE_CHECKSUM_SYNC",
                defaults.enable_checksum_sync,
            )?,
        })
    }
}

impl DatabaseConfig {
    fn from_env(prefix: &str) -> Result<Self> {
        let name_key = format!("{prefix}NAME");
        let database = std::env::var(&name_key)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SyncError::Config(format!("{name_key} is required")))?;

        Ok(Self {
            host: env_string(&format!("{prefix}HOST"), "localhost"),
            port: env_parse(&format!("{prefix}PORT"), 3306)?,
            user: env_string(&format!("{prefix}USER"), "root"),
            password: env_string(&format!("{prefix}PASSWORD"), ""),
            database,
        })
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| SyncError::Config(format!("{key} has an invalid value: {value:?}"))),
        _ => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => parse_bool(&value)
            .ok_or_else(|| SyncError::Config(format!("{key} has an invalid value: {value:?}"))),
        _ => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
