// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record families persisted by the message stores.
//!
//! Statuses are stored as their variant name (`New`, `CopiedToRAM`, ...).
//! Timestamps are stored in the fixed-width text form from
//! [`marquee_core::format_timestamp`].

use marquee_core::{Timestamp, format_timestamp, parse_timestamp};
use rusqlite::Row;
use rusqlite::types::{Type, Value};
use serde::Serialize;
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter, EnumString};

use crate::record_store::Record;

/// Lifecycle of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize)]
pub enum IngestStatus {
    New,
    Forwarded,
    Processed,
    ProcessingError,
}

impl IngestStatus {
    /// Whether the processor is done with a record in this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::ProcessingError)
    }
}

/// Lifecycle of a message in the delivering set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize)]
pub enum WorkingStatus {
    New,
    CopiedToRAM,
    CopiedFromRAM,
    HousekeepDelete,
}

/// Sort order for listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// An inbound message exactly as received from upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestRecord {
    /// Store-assigned primary key; `None` until inserted.
    pub id: Option<i64>,
    pub message_uuid: String,
    pub message_json: String,
    pub status: IngestStatus,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    /// Epoch milliseconds of `processed_at`, as a decimal string.
    pub processed_at_ms: Option<String>,
    /// When the upstream event nominally occurred.
    pub received_at: Timestamp,
}

/// A message in (or recently in) the delivering set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkingRecord {
    pub id: Option<i64>,
    pub msg_uuid: String,
    pub msg_json: String,
    /// Delivery metadata, opaque to the store.
    pub meta_json: String,
    pub status: WorkingStatus,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
    pub received_at: Timestamp,
}

/// Column names of `ingest_messages`.
pub mod ingest_columns {
    pub const MESSAGE_UUID: &str = "message_uuid";
    pub const MESSAGE_JSON: &str = "message_json";
    pub const MESSAGE_HASH: &str = "message_hash";
    pub const STATUS: &str = "status";
    pub const PROCESSED_AT: &str = "processed_at";
    pub const PROCESSED_AT_MS: &str = "processed_at_ms";
    pub const RECEIVED_AT: &str = "received_at";
}

/// Column names of `working_messages`.
pub mod working_columns {
    pub const MSG_UUID: &str = "msg_uuid";
    pub const MSG_JSON: &str = "msg_json";
    pub const META_JSON: &str = "meta_json";
    pub const STATUS: &str = "status";
    pub const RECEIVED_AT: &str = "received_at";
}

/// Column names shared by every record family.
pub const ID: &str = "id";
pub const CREATED_AT: &str = "created_at";
pub const MODIFIED_AT: &str = "modified_at";

/// SHA-256 hex digest used to index ingest payloads for dedup.
pub fn payload_hash(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

pub(crate) fn ts_value(ts: &Timestamp) -> Value {
    Value::Text(format_timestamp(ts))
}

fn get_timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<Timestamp> {
    let text: String = row.get(column)?;
    parse_column(row, column, &text, parse_timestamp)
}

fn get_optional_timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<Timestamp>> {
    let text: Option<String> = row.get(column)?;
    text.map(|s| parse_column(row, column, &s, parse_timestamp))
        .transpose()
}

fn get_status<S>(row: &Row<'_>, column: &str) -> rusqlite::Result<S>
where
    S: std::str::FromStr,
    S::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(column)?;
    parse_column(row, column, &text, |s| s.parse::<S>())
}

fn parse_column<T, E>(
    row: &Row<'_>,
    column: &str,
    text: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    parse(text).map_err(|e| {
        let idx = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

impl Record for IngestRecord {
    const TABLE: &'static str = "ingest_messages";
    const COLUMNS: &'static [&'static str] = &[
        ingest_columns::MESSAGE_UUID,
        ingest_columns::MESSAGE_JSON,
        ingest_columns::MESSAGE_HASH,
        ingest_columns::STATUS,
        CREATED_AT,
        MODIFIED_AT,
        ingest_columns::PROCESSED_AT,
        ingest_columns::PROCESSED_AT_MS,
        ingest_columns::RECEIVED_AT,
    ];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn key(&self) -> &str {
        &self.message_uuid
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.message_uuid.clone()),
            Value::Text(self.message_json.clone()),
            Value::Text(payload_hash(&self.message_json)),
            Value::Text(self.status.to_string()),
            ts_value(&self.created_at),
            ts_value(&self.modified_at),
            self.processed_at.as_ref().map_or(Value::Null, ts_value),
            self.processed_at_ms.clone().map_or(Value::Null, Value::Text),
            ts_value(&self.received_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(ID)?),
            message_uuid: row.get(ingest_columns::MESSAGE_UUID)?,
            message_json: row.get(ingest_columns::MESSAGE_JSON)?,
            status: get_status(row, ingest_columns::STATUS)?,
            created_at: get_timestamp(row, CREATED_AT)?,
            modified_at: get_timestamp(row, MODIFIED_AT)?,
            processed_at: get_optional_timestamp(row, ingest_columns::PROCESSED_AT)?,
            processed_at_ms: row.get(ingest_columns::PROCESSED_AT_MS)?,
            received_at: get_timestamp(row, ingest_columns::RECEIVED_AT)?,
        })
    }

    fn stamp(&mut self, now: Timestamp, created: bool) {
        if created {
            self.created_at = now;
        }
        self.modified_at = now;
    }
}

impl Record for WorkingRecord {
    const TABLE: &'static str = "working_messages";
    const COLUMNS: &'static [&'static str] = &[
        working_columns::MSG_UUID,
        working_columns::MSG_JSON,
        working_columns::META_JSON,
        working_columns::STATUS,
        CREATED_AT,
        MODIFIED_AT,
        working_columns::RECEIVED_AT,
    ];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn key(&self) -> &str {
        &self.msg_uuid
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.msg_uuid.clone()),
            Value::Text(self.msg_json.clone()),
            Value::Text(self.meta_json.clone()),
            Value::Text(self.status.to_string()),
            ts_value(&self.created_at),
            ts_value(&self.modified_at),
            ts_value(&self.received_at),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(ID)?),
            msg_uuid: row.get(working_columns::MSG_UUID)?,
            msg_json: row.get(working_columns::MSG_JSON)?,
            meta_json: row.get(working_columns::META_JSON)?,
            status: get_status(row, working_columns::STATUS)?,
            created_at: get_timestamp(row, CREATED_AT)?,
            modified_at: get_timestamp(row, MODIFIED_AT)?,
            received_at: get_timestamp(row, working_columns::RECEIVED_AT)?,
        })
    }

    fn stamp(&mut self, now: Timestamp, created: bool) {
        if created {
            self.created_at = now;
        }
        self.modified_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn statuses_persist_by_variant_name() {
        assert_eq!(IngestStatus::ProcessingError.to_string(), "ProcessingError");
        assert_eq!(WorkingStatus::CopiedToRAM.to_string(), "CopiedToRAM");
        assert_eq!(
            WorkingStatus::from_str("HousekeepDelete").unwrap(),
            WorkingStatus::HousekeepDelete
        );
        assert!(IngestStatus::from_str("Done").is_err());
    }

    #[test]
    fn terminal_ingest_statuses() {
        assert!(!IngestStatus::New.is_terminal());
        assert!(!IngestStatus::Forwarded.is_terminal());
        assert!(IngestStatus::Processed.is_terminal());
        assert!(IngestStatus::ProcessingError.is_terminal());
    }

    #[test]
    fn payload_hash_is_stable_sha256_hex() {
        assert_eq!(
            payload_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(payload_hash(r#"{"a":1}"#), payload_hash(r#"{"a":2}"#));
    }

    #[test]
    fn values_align_with_columns() {
        let now = marquee_core::now();
        let record = WorkingRecord {
            id: None,
            msg_uuid: "u".into(),
            msg_json: "{}".into(),
            meta_json: "{}".into(),
            status: WorkingStatus::New,
            created_at: now,
            modified_at: now,
            received_at: now,
        };
        assert_eq!(record.values().len(), WorkingRecord::COLUMNS.len());
    }
}
