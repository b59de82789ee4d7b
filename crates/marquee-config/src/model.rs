// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Marquee message stores.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Marquee configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MarqueeConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// SQLite database settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Age- and status-based deletion rules.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Name reported in logs and by `marquee doctor`.
    #[serde(default = "default_daemon_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            name: default_daemon_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_daemon_name() -> String {
    "marquee".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file holding both message stores.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long SQLite waits on a locked database before failing, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("marquee").join("marquee.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("marquee.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Retention rules applied by the periodic sweep.
///
/// Every `*_max_age` value is a relative-time expression such as `-2 days`.
/// Setting one to an empty string disables that rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Run the periodic sweep from `marquee serve`.
    #[serde(default = "default_retention_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Age after which Processed / ProcessingError ingest records are deleted.
    #[serde(default = "default_ingest_processed_max_age")]
    pub ingest_processed_max_age: String,

    /// Age after which New / Forwarded ingest records are deleted.
    #[serde(default = "default_ingest_unprocessed_max_age")]
    pub ingest_unprocessed_max_age: String,

    /// Age after which any ingest record is deleted.
    #[serde(default = "default_ingest_max_age")]
    pub ingest_max_age: String,

    /// Age after which any working record is deleted.
    #[serde(default = "default_working_max_age")]
    pub working_max_age: String,

    /// Delete working records marked HousekeepDelete on every sweep.
    #[serde(default = "default_sweep_housekeep")]
    pub sweep_housekeep: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: default_retention_enabled(),
            interval_secs: default_interval_secs(),
            ingest_processed_max_age: default_ingest_processed_max_age(),
            ingest_unprocessed_max_age: default_ingest_unprocessed_max_age(),
            ingest_max_age: default_ingest_max_age(),
            working_max_age: default_working_max_age(),
            sweep_housekeep: default_sweep_housekeep(),
        }
    }
}

impl RetentionConfig {
    /// All age rules as `(key, expression)` pairs, including disabled (empty) ones.
    pub fn age_rules(&self) -> [(&'static str, &str); 4] {
        [
            ("ingest_processed_max_age", self.ingest_processed_max_age.as_str()),
            ("ingest_unprocessed_max_age", self.ingest_unprocessed_max_age.as_str()),
            ("ingest_max_age", self.ingest_max_age.as_str()),
            ("working_max_age", self.working_max_age.as_str()),
        ]
    }
}

fn default_retention_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    300
}

fn default_ingest_processed_max_age() -> String {
    "-2 days".to_string()
}

fn default_ingest_unprocessed_max_age() -> String {
    "-7 days".to_string()
}

fn default_ingest_max_age() -> String {
    "-1 months".to_string()
}

fn default_working_max_age() -> String {
    "-2 days".to_string()
}

fn default_sweep_housekeep() -> bool {
    true
}
