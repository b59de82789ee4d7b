// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All SQLite work is serialized through tokio-rusqlite's single background
//! thread. A [`Database`] is cheap to clone; every clone shares that thread.
//! Do NOT open additional connections to the same file for writes.

use std::path::Path;
use std::time::Duration;

use marquee_config::model::StorageConfig;
use marquee_core::MarqueeError;
use rusqlite::{ErrorCode, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use crate::migrations::{self, MigrationOutcome, OnMismatch, SchemaState};

/// Path understood by SQLite as a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Handle to the single SQLite connection backing both message stores.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open (or create) the database at `path` with default storage settings.
    pub async fn open(path: &str) -> Result<Self, MarqueeError> {
        let config = StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        };
        Self::open_with(&config).await
    }

    /// Open (or create) the database described by `config`, apply PRAGMAs,
    /// and bring the schema up to date. A mismatched migration history
    /// rebuilds the schema, discarding stored messages.
    pub async fn open_with(config: &StorageConfig) -> Result<Self, MarqueeError> {
        Self::open_migrating(config, OnMismatch::Rebuild).await
    }

    /// Like [`Database::open_with`], but a mismatched migration history is
    /// returned as an error and the stored messages are left in place.
    pub async fn open_preserving(config: &StorageConfig) -> Result<Self, MarqueeError> {
        Self::open_migrating(config, OnMismatch::Refuse).await
    }

    /// Open an existing database file for diagnostics.
    ///
    /// The file is never created and no PRAGMAs or migrations are applied.
    /// Returns the handle together with the schema state it was found in.
    pub async fn inspect(config: &StorageConfig) -> Result<(Self, SchemaState), MarqueeError> {
        let path = config.database_path.clone();
        let opened = if path == IN_MEMORY {
            tokio_rusqlite::Connection::open_in_memory().await
        } else {
            tokio_rusqlite::Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .await
        };
        let conn = opened.map_err(MarqueeError::storage)?;

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let state = conn
            .call(move |conn| {
                conn.busy_timeout(busy_timeout)?;
                Ok::<_, rusqlite::Error>(migrations::inspect_schema(conn))
            })
            .await
            .map_err(map_tr_err)??;
        debug!(path = %path, state = ?state, "database inspected");

        Ok((Self { conn, path }, state))
    }

    async fn open_migrating(
        config: &StorageConfig,
        on_mismatch: OnMismatch,
    ) -> Result<Self, MarqueeError> {
        let path = config.database_path.clone();
        if path != IN_MEMORY
            && let Some(parent) = Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(MarqueeError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(MarqueeError::storage)?;

        let wal_mode = config.wal_mode && path != IN_MEMORY;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let journal_mode = conn
            .call(move |conn| {
                conn.busy_timeout(busy_timeout)?;
                let mode: String = conn.pragma_update_and_check(
                    None,
                    "journal_mode",
                    if wal_mode { "WAL" } else { "DELETE" },
                    |row| row.get(0),
                )?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                Ok(mode)
            })
            .await
            .map_err(map_tr_err)?;
        debug!(path = %path, journal_mode = %journal_mode, "database pragmas applied");

        let outcome = conn
            .call(move |conn| {
                Ok::<_, rusqlite::Error>(migrations::run_migrations_with(conn, on_mismatch))
            })
            .await
            .map_err(map_tr_err)??;
        match outcome {
            MigrationOutcome::Applied(0) => {}
            MigrationOutcome::Applied(n) => info!(path = %path, applied = n, "schema migrated"),
            MigrationOutcome::Rebuilt(n) => info!(path = %path, applied = n, "schema rebuilt"),
        }

        Ok(Self { conn, path })
    }

    /// Open a private in-memory database. Used by tests and dry runs.
    pub async fn open_in_memory() -> Result<Self, MarqueeError> {
        Self::open(IN_MEMORY).await
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Filesystem path this database was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Cheap liveness probe (`SELECT 1`).
    pub async fn health_check(&self) -> Result<(), MarqueeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Run `PRAGMA integrity_check` and return its first result line
    /// (`"ok"` for a healthy file).
    pub async fn integrity_check(&self) -> Result<String, MarqueeError> {
        self.conn
            .call(|conn| {
                let first: Option<String> = conn
                    .query_row("PRAGMA integrity_check", [], |row| row.get(0))
                    .optional()?;
                Ok(first.unwrap_or_else(|| "no result".to_string()))
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL and close the connection.
    ///
    /// Other clones of this handle observe `StorageUnavailable` afterwards.
    pub async fn close(self) -> Result<(), MarqueeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(path = %self.path, "WAL checkpoint complete");
        self.conn.close().await.map_err(map_tr_err)
    }
}

/// Convert a tokio-rusqlite error into `MarqueeError::StorageUnavailable`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MarqueeError {
    MarqueeError::StorageUnavailable {
        source: Box::new(e),
    }
}

/// Whether `e` is a UNIQUE or PRIMARY KEY constraint violation.
pub fn is_unique_violation(e: &tokio_rusqlite::Error<rusqlite::Error>) -> bool {
    matches!(
        e,
        tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation
                && matches!(
                    err.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
    )
}
