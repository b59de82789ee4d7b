// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingest store: inbound messages exactly as received from upstream.
//!
//! Upstream is known to resend identical payloads, so every ingest is checked
//! for an existing record with the same content before a new identifier is
//! assigned. The check goes through the `message_hash` unique index; the
//! index also catches two identical ingests racing each other.

use chrono::SubsecRound;
use marquee_core::{MarqueeError, RejectReason, RelativeTime, Timestamp, now};
use rusqlite::types::Value;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::models::{IngestRecord, IngestStatus, ingest_columns as col, payload_hash};
use crate::record_store::{Filter, RecordStore};

/// Durable store of [`IngestRecord`]s.
#[derive(Debug, Clone)]
pub struct IngestStore {
    records: RecordStore<IngestRecord>,
}

impl IngestStore {
    pub fn new(db: Database) -> Self {
        Self {
            records: RecordStore::new(db),
        }
    }

    /// The underlying generic store.
    pub fn records(&self) -> &RecordStore<IngestRecord> {
        &self.records
    }

    /// Store a new inbound payload with status `New` and a fresh uuid.
    ///
    /// Returns `Rejected { reason: Duplicate }` when a record with the exact
    /// same payload already exists.
    pub async fn ingest(
        &self,
        payload_json: &str,
        received_at: Timestamp,
    ) -> Result<IngestRecord, MarqueeError> {
        if self.records.exists_where(same_payload(payload_json)).await? {
            debug!(len = payload_json.len(), "duplicate payload rejected");
            return Err(duplicate());
        }

        let t = now();
        let record = IngestRecord {
            id: None,
            message_uuid: Uuid::new_v4().to_string(),
            message_json: payload_json.to_string(),
            status: IngestStatus::New,
            created_at: t,
            modified_at: t,
            processed_at: None,
            processed_at_ms: None,
            received_at: received_at.trunc_subsecs(3),
        };

        match self.records.insert(record).await {
            Ok(stored) => {
                info!(uuid = %stored.message_uuid, "message ingested");
                Ok(stored)
            }
            Err(MarqueeError::DuplicateKey { .. }) => {
                debug!("duplicate payload rejected by unique index");
                Err(duplicate())
            }
            Err(e) => Err(e),
        }
    }

    /// Set status `Forwarded`. Returns `false` (and logs) if `uuid` is unknown.
    pub async fn mark_forwarded(&self, uuid: &str) -> Result<bool, MarqueeError> {
        self.set_status(uuid, IngestStatus::Forwarded, Vec::new())
            .await
    }

    /// Set status `Processed` and record when processing finished.
    pub async fn mark_processed(&self, uuid: &str) -> Result<bool, MarqueeError> {
        let at = now();
        let extra = vec![
            (col::PROCESSED_AT, crate::models::ts_value(&at)),
            (col::PROCESSED_AT_MS, Value::Text(at.timestamp_millis().to_string())),
        ];
        self.set_status(uuid, IngestStatus::Processed, extra).await
    }

    pub async fn mark_processing_error(&self, uuid: &str) -> Result<bool, MarqueeError> {
        self.set_status(uuid, IngestStatus::ProcessingError, Vec::new())
            .await
    }

    async fn set_status(
        &self,
        uuid: &str,
        status: IngestStatus,
        mut assignments: Vec<(&'static str, Value)>,
    ) -> Result<bool, MarqueeError> {
        assignments.push((col::STATUS, Value::Text(status.to_string())));
        let changed = self
            .records
            .update_columns(Filter::text(col::MESSAGE_UUID, uuid), assignments)
            .await?;
        if changed == 0 {
            warn!(uuid, %status, "ingest record not found, status unchanged");
            return Ok(false);
        }
        debug!(uuid, %status, "ingest status updated");
        Ok(true)
    }

    pub async fn find_by_uuid(&self, uuid: &str) -> Result<Option<IngestRecord>, MarqueeError> {
        let mut found = self
            .records
            .find_where(Filter::text(col::MESSAGE_UUID, uuid))
            .await?;
        Ok(found.pop())
    }

    pub async fn find_with_status(
        &self,
        status: IngestStatus,
    ) -> Result<Vec<IngestRecord>, MarqueeError> {
        self.records.find_where(status_filter(&[status])).await
    }

    /// Records still owed to the processor (`New` or `Forwarded`).
    pub async fn find_unprocessed(&self) -> Result<Vec<IngestRecord>, MarqueeError> {
        self.records.find_where(unprocessed()).await
    }

    /// Records the processor is done with (`Processed` or `ProcessingError`).
    pub async fn find_processed(&self) -> Result<Vec<IngestRecord>, MarqueeError> {
        self.records.find_where(processed()).await
    }

    /// Records whose payload contains `substring`.
    pub async fn find_containing(&self, substring: &str) -> Result<Vec<IngestRecord>, MarqueeError> {
        self.records
            .find_where(Filter::contains(col::MESSAGE_JSON, substring))
            .await
    }

    /// Records whose whole payload equals `text`.
    pub async fn find_matching_whole(&self, text: &str) -> Result<Vec<IngestRecord>, MarqueeError> {
        self.records.find_where(same_payload(text)).await
    }

    pub async fn count_matching_whole(&self, text: &str) -> Result<usize, MarqueeError> {
        self.records.count_where(same_payload(text)).await
    }

    /// Record count for every status, including statuses with no records.
    pub async fn count_by_status(&self) -> Result<Vec<(IngestStatus, usize)>, MarqueeError> {
        let groups = self.records.count_grouped_by(col::STATUS).await?;
        Ok(IngestStatus::iter()
            .map(|status| {
                let name = status.to_string();
                let count = groups
                    .iter()
                    .find(|(value, _)| *value == name)
                    .map_or(0, |(_, n)| *n);
                (status, count)
            })
            .collect())
    }

    /// Delete `Processed`/`ProcessingError` records last modified before `now + age`.
    pub async fn delete_processed_older_than(
        &self,
        age: &RelativeTime,
    ) -> Result<usize, MarqueeError> {
        self.records.delete_older_than_where(age, processed()).await
    }

    /// Delete `New`/`Forwarded` records last modified before `now + age`.
    pub async fn delete_unprocessed_older_than(
        &self,
        age: &RelativeTime,
    ) -> Result<usize, MarqueeError> {
        self.records.delete_older_than_where(age, unprocessed()).await
    }

    /// Delete every record last modified before `now + age`, whatever its status.
    pub async fn delete_older_than(&self, age: &RelativeTime) -> Result<usize, MarqueeError> {
        self.records.delete_older_than(age).await
    }
}

fn duplicate() -> MarqueeError {
    MarqueeError::Rejected {
        reason: RejectReason::Duplicate,
    }
}

fn same_payload(payload: &str) -> Filter {
    Filter::text(col::MESSAGE_HASH, payload_hash(payload)).and(Filter::text(col::MESSAGE_JSON, payload))
}

fn status_filter(statuses: &[IngestStatus]) -> Filter {
    Filter::any_text(col::STATUS, statuses.iter().map(ToString::to_string))
}

fn terminal_filter(terminal: bool) -> Filter {
    let statuses: Vec<IngestStatus> = IngestStatus::iter()
        .filter(|s| s.is_terminal() == terminal)
        .collect();
    status_filter(&statuses)
}

fn unprocessed() -> Filter {
    terminal_filter(false)
}

fn processed() -> Filter {
    terminal_filter(true)
}
