// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Working store: durable mirror of the in-memory delivering set.
//!
//! One record per message uuid. The delivery side copies records to and
//! from its in-memory set, flags finished ones `HousekeepDelete`, and the
//! retention runner sweeps them.

use chrono::SubsecRound;
use marquee_core::{MarqueeError, RelativeTime, Timestamp, now};
use rusqlite::types::Value;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::database::Database;
use crate::models::{SortDirection, WorkingRecord, WorkingStatus, working_columns as col};
use crate::record_store::{Filter, Record, RecordStore};

/// Metadata stored for a freshly created working record.
pub const EMPTY_META: &str = "{}";

/// Durable store of [`WorkingRecord`]s.
#[derive(Debug, Clone)]
pub struct WorkingStore {
    records: RecordStore<WorkingRecord>,
}

impl WorkingStore {
    pub fn new(db: Database) -> Self {
        Self {
            records: RecordStore::new(db),
        }
    }

    pub fn records(&self) -> &RecordStore<WorkingRecord> {
        &self.records
    }

    /// Create the working record for `uuid`. Fails with `DuplicateKey` if
    /// one already exists.
    pub async fn create(
        &self,
        uuid: &str,
        payload_json: &str,
        received_at: Timestamp,
        status: WorkingStatus,
    ) -> Result<WorkingRecord, MarqueeError> {
        let t = now();
        let record = WorkingRecord {
            id: None,
            msg_uuid: uuid.to_string(),
            msg_json: payload_json.to_string(),
            meta_json: EMPTY_META.to_string(),
            status,
            created_at: t,
            modified_at: t,
            received_at: received_at.trunc_subsecs(3),
        };
        let stored = self.records.insert(record).await?;
        debug!(uuid, %status, "working record created");
        Ok(stored)
    }

    /// Replace the payload, leaving metadata and status untouched.
    pub async fn update_payload(&self, uuid: &str, payload_json: &str) -> Result<(), MarqueeError> {
        self.update_one(uuid, col::MSG_JSON, Value::Text(payload_json.to_string()))
            .await
    }

    /// Replace the delivery metadata, leaving payload and status untouched.
    pub async fn update_metadata(&self, uuid: &str, meta_json: &str) -> Result<(), MarqueeError> {
        self.update_one(uuid, col::META_JSON, Value::Text(meta_json.to_string()))
            .await
    }

    pub async fn update_status(&self, uuid: &str, status: WorkingStatus) -> Result<(), MarqueeError> {
        self.update_one(uuid, col::STATUS, Value::Text(status.to_string()))
            .await?;
        debug!(uuid, %status, "working status updated");
        Ok(())
    }

    async fn update_one(
        &self,
        uuid: &str,
        column: &'static str,
        value: Value,
    ) -> Result<(), MarqueeError> {
        let changed = self
            .records
            .update_columns(by_uuid(uuid), vec![(column, value)])
            .await?;
        if changed == 0 {
            return Err(MarqueeError::NotFound {
                table: WorkingRecord::TABLE,
                key: uuid.to_string(),
            });
        }
        Ok(())
    }

    pub async fn find_by_uuid(&self, uuid: &str) -> Result<Option<WorkingRecord>, MarqueeError> {
        Ok(self.records.find_where(by_uuid(uuid)).await?.pop())
    }

    pub async fn exists_by_uuid(&self, uuid: &str) -> Result<bool, MarqueeError> {
        self.records.exists_where(by_uuid(uuid)).await
    }

    pub async fn find_with_status(
        &self,
        status: WorkingStatus,
    ) -> Result<Vec<WorkingRecord>, MarqueeError> {
        self.records.find_where(with_status(status)).await
    }

    /// Every record ordered by `received_at` (ties in insertion order).
    pub async fn find_all_sorted_by_received_at(
        &self,
        direction: SortDirection,
    ) -> Result<Vec<WorkingRecord>, MarqueeError> {
        self.records
            .find_all_sorted_by(col::RECEIVED_AT, direction)
            .await
    }

    /// Record count for every status, including statuses with no records.
    pub async fn count_by_status(&self) -> Result<Vec<(WorkingStatus, usize)>, MarqueeError> {
        let groups = self.records.count_grouped_by(col::STATUS).await?;
        Ok(WorkingStatus::iter()
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

    /// Returns whether a record was removed.
    pub async fn delete_by_uuid(&self, uuid: &str) -> Result<bool, MarqueeError> {
        Ok(self.records.delete_where(by_uuid(uuid)).await? > 0)
    }

    pub async fn delete_all_with_status(&self, status: WorkingStatus) -> Result<usize, MarqueeError> {
        self.records.delete_where(with_status(status)).await
    }

    pub async fn delete_older_than(&self, age: &RelativeTime) -> Result<usize, MarqueeError> {
        self.records.delete_older_than(age).await
    }

    pub async fn delete_all(&self) -> Result<usize, MarqueeError> {
        self.records.delete_where(Filter::All).await
    }
}

fn by_uuid(uuid: &str) -> Filter {
    Filter::text(col::MSG_UUID, uuid)
}

fn with_status(status: WorkingStatus) -> Filter {
    Filter::text(col::STATUS, status.to_string())
}
