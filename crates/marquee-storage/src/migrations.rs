// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL migration files are compiled into the binary at build time via
//! `embed_migrations!`. Migrations run automatically on database open.
//!
//! The schema is disposable: when the history recorded in the database
//! diverges from (or is missing from) the compiled migrations, both message
//! tables and the history are dropped and rebuilt from scratch.

use marquee_core::MarqueeError;
use refinery::error::Kind;
use tracing::{debug, warn};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Tables owned by the migrations, dropped on a destructive rebuild.
const MANAGED_TABLES: &[&str] = &["ingest_messages", "working_messages", HISTORY_TABLE];

const HISTORY_TABLE: &str = "refinery_schema_history";

/// What happened while bringing the schema up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Pending migrations (possibly none) were applied in place.
    Applied(usize),
    /// The recorded history did not match; the schema was dropped and rebuilt.
    Rebuilt(usize),
}

/// How to react when the recorded history does not match the compiled
/// migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMismatch {
    /// Drop the message tables and rebuild them.
    Rebuild,
    /// Leave the database untouched and return an error.
    Refuse,
}

/// Schema state of a database, read without modifying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaState {
    /// Every compiled migration is applied.
    Current,
    /// The history matches but this many migrations are not yet applied.
    Pending(usize),
    /// The history names a migration this binary does not have, or one whose
    /// contents differ.
    Mismatch(String),
}

/// Run all pending migrations against the given connection, rebuilding the
/// schema if the recorded history does not match.
///
/// Refinery tracks applied migrations in its own `refinery_schema_history` table.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<MigrationOutcome, MarqueeError> {
    run_migrations_with(conn, OnMismatch::Rebuild)
}

/// Run all pending migrations, handling a history mismatch per `on_mismatch`.
pub fn run_migrations_with(
    conn: &mut rusqlite::Connection,
    on_mismatch: OnMismatch,
) -> Result<MigrationOutcome, MarqueeError> {
    match strict_runner().run(conn) {
        Ok(report) => {
            let applied = report.applied_migrations().len();
            debug!(applied, "migrations applied");
            Ok(MigrationOutcome::Applied(applied))
        }
        Err(e) if is_history_mismatch(e.kind()) && on_mismatch == OnMismatch::Rebuild => {
            warn!(error = %e, "migration history mismatch, rebuilding message tables (stored messages are discarded)");
            drop_managed_tables(conn)?;
            let report = strict_runner().run(conn).map_err(MarqueeError::storage)?;
            Ok(MigrationOutcome::Rebuilt(report.applied_migrations().len()))
        }
        Err(e) => Err(MarqueeError::storage(e)),
    }
}

/// Compare the recorded history with the compiled migrations.
///
/// Issues only reads. A database without a history table reports every
/// compiled migration as pending.
pub fn inspect_schema(conn: &mut rusqlite::Connection) -> Result<SchemaState, MarqueeError> {
    let runner = strict_runner();
    let compiled = runner.get_migrations();

    let has_history: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [HISTORY_TABLE],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)
        .map_err(MarqueeError::storage)?;
    if !has_history {
        return Ok(SchemaState::Pending(compiled.len()));
    }

    let applied = runner
        .get_applied_migrations(conn)
        .map_err(MarqueeError::storage)?;
    for app in &applied {
        match compiled.iter().find(|m| m.version() == app.version()) {
            None => {
                return Ok(SchemaState::Mismatch(format!(
                    "applied migration {app} is unknown to this binary"
                )));
            }
            Some(m) if m != app => {
                return Ok(SchemaState::Mismatch(format!(
                    "applied migration {app} differs from {m}"
                )));
            }
            Some(_) => {}
        }
    }

    let pending = compiled
        .iter()
        .filter(|m| !applied.iter().any(|a| a.version() == m.version()))
        .count();
    Ok(if pending == 0 {
        SchemaState::Current
    } else {
        SchemaState::Pending(pending)
    })
}

fn strict_runner() -> refinery::Runner {
    embedded::migrations::runner()
        .set_abort_divergent(true)
        .set_abort_missing(true)
}

fn is_history_mismatch(kind: &Kind) -> bool {
    matches!(kind, Kind::DivergentVersion(..) | Kind::MissingVersion(..))
}

fn drop_managed_tables(conn: &mut rusqlite::Connection) -> Result<(), MarqueeError> {
    let tx = conn.transaction().map_err(MarqueeError::storage)?;
    for table in MANAGED_TABLES {
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))
            .map_err(MarqueeError::storage)?;
    }
    tx.commit().map_err(MarqueeError::storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &rusqlite::Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn fresh_database_gets_both_tables() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        let outcome = run_migrations(&mut conn).unwrap();
        assert_eq!(outcome, MigrationOutcome::Applied(1));
        assert!(table_exists(&conn, "ingest_messages"));
        assert!(table_exists(&conn, "working_messages"));
    }

    #[test]
    fn rerun_is_a_no_op() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(run_migrations(&mut conn).unwrap(), MigrationOutcome::Applied(0));
    }

    #[test]
    fn unknown_history_triggers_rebuild() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO working_messages (msg_uuid, msg_json, created_at, modified_at, received_at)
             VALUES ('u', '{}', 'x', 'x', 'x')",
            [],
        )
        .unwrap();
        // A migration this binary does not know about.
        conn.execute(
            "INSERT INTO refinery_schema_history (version, name, applied_on, checksum)
             VALUES (99, 'future', '2026-01-01T00:00:00Z', '0')",
            [],
        )
        .unwrap();

        let outcome = run_migrations(&mut conn).unwrap();
        assert_eq!(outcome, MigrationOutcome::Rebuilt(1));

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM working_messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0, "rebuild discards stored rows");
    }

    fn seed_unknown_history(conn: &rusqlite::Connection) {
        conn.execute(
            "INSERT INTO working_messages (msg_uuid, msg_json, created_at, modified_at, received_at)
             VALUES ('u', '{}', 'x', 'x', 'x')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO refinery_schema_history (version, name, applied_on, checksum)
             VALUES (2, 'newer_binary', '2026-01-01T00:00:00Z', '0')",
            [],
        )
        .unwrap();
    }

    fn working_rows(conn: &rusqlite::Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM working_messages", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn refuse_leaves_mismatched_database_untouched() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        seed_unknown_history(&conn);

        assert!(run_migrations_with(&mut conn, OnMismatch::Refuse).is_err());
        assert_eq!(working_rows(&conn), 1);
    }

    #[test]
    fn inspect_reports_state_without_writing() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        assert_eq!(inspect_schema(&mut conn).unwrap(), SchemaState::Pending(1));
        assert!(!table_exists(&conn, HISTORY_TABLE));

        run_migrations(&mut conn).unwrap();
        assert_eq!(inspect_schema(&mut conn).unwrap(), SchemaState::Current);

        seed_unknown_history(&conn);
        let state = inspect_schema(&mut conn).unwrap();
        assert!(
            matches!(&state, SchemaState::Mismatch(msg) if msg.contains("newer_binary")),
            "{state:?}"
        );
        assert_eq!(working_rows(&conn), 1);
    }
}
