// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `marquee doctor` command implementation.
//!
//! Runs diagnostic checks against the configured database and retention
//! rules.

use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use marquee_config::MarqueeConfig;
use marquee_config::model::StorageConfig;
use marquee_core::MarqueeError;
use marquee_storage::database::IN_MEMORY;
use marquee_storage::migrations::SchemaState;
use marquee_storage::{Database, RetentionPolicy};

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `marquee doctor` command. `--plain` disables colored output.
pub async fn run_doctor(config: &MarqueeConfig, plain: bool) -> Result<(), MarqueeError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let results = run_checks(config).await;

    println!();
    println!("  marquee doctor");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;
    for result in &results {
        match result.status {
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Fail => fail_count += 1,
            CheckStatus::Pass => {}
        }
        println!("{}", format_line(result, use_color));
    }

    println!();
    if fail_count > 0 || warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(())
}

async fn run_checks(config: &MarqueeConfig) -> Vec<CheckResult> {
    let mut results = vec![check_retention_rules(config)];
    results.extend(check_database(&config.storage).await);
    results.push(check_memory_baseline());
    results
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red(), result.message.red()),
        };
        format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

/// Every configured age expression parses.
fn check_retention_rules(config: &MarqueeConfig) -> CheckResult {
    let start = Instant::now();
    match RetentionPolicy::from_config(&config.retention) {
        Ok(_) if !config.retention.enabled => CheckResult::new(
            "Retention rules",
            CheckStatus::Warn,
            "valid, periodic sweep disabled",
            start,
        ),
        Ok(_) => CheckResult::new(
            "Retention rules",
            CheckStatus::Pass,
            format!("valid, sweep every {}s", config.retention.interval_secs),
            start,
        ),
        Err(e) => CheckResult::new("Retention rules", CheckStatus::Fail, e.to_string(), start),
    }
}

/// Inspect the database schema, then run the health and integrity checks.
/// Nothing is migrated or rebuilt. A missing file is reported, not created.
async fn check_database(storage: &StorageConfig) -> Vec<CheckResult> {
    let start = Instant::now();
    let db_path = &storage.database_path;
    if db_path != IN_MEMORY && !Path::new(db_path).exists() {
        return vec![CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first run)"),
            start,
        )];
    }

    let (db, schema) = match Database::inspect(storage).await {
        Ok(opened) => opened,
        Err(e) => {
            return vec![CheckResult::new(
                "Database",
                CheckStatus::Fail,
                format!("open failed: {e}"),
                start,
            )];
        }
    };

    let mut results = Vec::with_capacity(3);
    results.push(match db.health_check().await {
        Ok(()) => CheckResult::new("Database", CheckStatus::Pass, "connected", start),
        Err(e) => CheckResult::new("Database", CheckStatus::Fail, format!("query failed: {e}"), start),
    });
    results.push(check_schema(schema, start));

    let start = Instant::now();
    results.push(match db.integrity_check().await {
        Ok(verdict) if verdict == "ok" => {
            CheckResult::new("DB integrity", CheckStatus::Pass, "ok", start)
        }
        Ok(verdict) => CheckResult::new("DB integrity", CheckStatus::Fail, verdict, start),
        Err(e) => CheckResult::new(
            "DB integrity",
            CheckStatus::Fail,
            format!("check failed: {e}"),
            start,
        ),
    });

    if let Err(e) = db.close().await {
        tracing::warn!(error = %e, "database close failed after diagnostics");
    }
    results
}

fn check_schema(schema: SchemaState, start: Instant) -> CheckResult {
    match schema {
        SchemaState::Current => CheckResult::new("DB schema", CheckStatus::Pass, "up to date", start),
        SchemaState::Pending(n) => CheckResult::new(
            "DB schema",
            CheckStatus::Warn,
            format!("{n} migration(s) pending, applied on next start"),
            start,
        ),
        SchemaState::Mismatch(detail) => CheckResult::new(
            "DB schema",
            CheckStatus::Fail,
            format!("{detail}; `marquee serve` would rebuild the schema and discard stored messages"),
            start,
        ),
    }
}

/// Memory baseline via jemalloc.
fn check_memory_baseline() -> CheckResult {
    let start = Instant::now();

    #[cfg(not(target_env = "msvc"))]
    {
        let _ = tikv_jemalloc_ctl::epoch::advance();
        let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
        let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
        let allocated_mb = allocated as f64 / (1024.0 * 1024.0);
        let resident_mb = resident as f64 / (1024.0 * 1024.0);
        CheckResult::new(
            "Memory baseline",
            CheckStatus::Pass,
            format!("heap: {allocated_mb:.1} MB, resident: {resident_mb:.1} MB"),
            start,
        )
    }

    #[cfg(target_env = "msvc")]
    {
        CheckResult::new(
            "Memory baseline",
            CheckStatus::Warn,
            "jemalloc not available on MSVC",
            start,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_db(path: &str) -> MarqueeConfig {
        let mut config = marquee_config::load_and_validate_str("").unwrap();
        config.storage.database_path = path.to_string();
        config
    }

    #[test]
    fn default_retention_rules_pass() {
        let result = check_retention_rules(&config_with_db(":memory:"));
        assert_eq!(result.status, CheckStatus::Pass);
        assert!(result.message.contains("sweep every"));
    }

    #[test]
    fn disabled_sweep_warns() {
        let mut config = config_with_db(":memory:");
        config.retention.enabled = false;
        assert_eq!(check_retention_rules(&config).status, CheckStatus::Warn);
    }

    #[test]
    fn bad_retention_expression_fails() {
        let mut config = config_with_db(":memory:");
        config.retention.working_max_age = "soon".to_string();
        let result = check_retention_rules(&config);
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.message.contains("soon"), "{}", result.message);
    }

    #[tokio::test]
    async fn missing_database_warns_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let config = config_with_db(path.to_str().unwrap());

        let results = check_database(&config.storage).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, CheckStatus::Warn);
        assert!(results[0].message.contains("not found"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn existing_database_passes_health_and_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marquee.db");
        let config = config_with_db(path.to_str().unwrap());
        Database::open_with(&config.storage).await.unwrap().close().await.unwrap();

        let results = check_database(&config.storage).await;
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Database", "DB schema", "DB integrity"]);
        assert!(results.iter().all(|r| r.status == CheckStatus::Pass));
    }

    #[tokio::test]
    async fn mismatched_history_fails_and_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newer.db");
        let config = config_with_db(path.to_str().unwrap());

        let db = Database::open_with(&config.storage).await.unwrap();
        db.connection()
            .call(|conn| {
                conn.execute(
                    "INSERT INTO working_messages (msg_uuid, msg_json, created_at, modified_at, received_at)
                     VALUES ('kept', '{}', 'a', 'a', 'a')",
                    [],
                )?;
                conn.execute(
                    "INSERT INTO refinery_schema_history (version, name, applied_on, checksum)
                     VALUES (2, 'newer_binary', '2026-01-01T00:00:00Z', '0')",
                    [],
                )
            })
            .await
            .unwrap();
        db.close().await.unwrap();

        let results = check_database(&config.storage).await;
        let schema = results.iter().find(|r| r.name == "DB schema").unwrap();
        assert_eq!(schema.status, CheckStatus::Fail);
        assert!(schema.message.contains("newer_binary"), "{}", schema.message);

        let (db, _) = Database::inspect(&config.storage).await.unwrap();
        let rows: i64 = db
            .connection()
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM working_messages", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(rows, 1);
        db.close().await.unwrap();
    }

    #[test]
    fn pending_schema_warns() {
        let result = check_schema(SchemaState::Pending(1), Instant::now());
        assert_eq!(result.status, CheckStatus::Warn);
    }

    #[test]
    fn plain_lines_are_tagged() {
        let result = CheckResult {
            name: "Database".to_string(),
            status: CheckStatus::Fail,
            message: "open failed".to_string(),
            duration: Duration::from_millis(5),
        };
        let line = format_line(&result, false);
        assert!(line.starts_with("    [FAIL] Database"));
        assert!(line.ends_with("open failed (5ms)"));
    }

    #[test]
    fn memory_baseline_reports() {
        let result = check_memory_baseline();
        assert!(result.status == CheckStatus::Pass || result.status == CheckStatus::Warn);
    }
}
