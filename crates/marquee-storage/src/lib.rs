// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Marquee message pipeline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a generic
//! record store, the ingest and working message stores built on it, a
//! synchronous-access adapter for non-async callers, and the retention
//! runner. All SQLite work is serialized on tokio-rusqlite's single
//! background thread.

pub mod access;
pub mod database;
pub mod ingest;
pub mod migrations;
pub mod models;
pub mod record_store;
pub mod retention;
pub mod working;

pub use access::{StoreAccess, WriteOp};
pub use database::Database;
pub use ingest::IngestStore;
pub use models::{IngestRecord, IngestStatus, SortDirection, WorkingRecord, WorkingStatus};
pub use record_store::{Filter, Record, RecordStore};
pub use retention::{RetentionPolicy, RetentionReport, RetentionRunner};
pub use working::WorkingStore;
