// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end storage tests.

use std::sync::Arc;

use chrono::TimeDelta;
use marquee_config::model::StorageConfig;
use marquee_core::{MarqueeError, format_timestamp, now};
use marquee_storage::{
    Database, IngestStore, RetentionPolicy, RetentionRunner, StoreAccess, WorkingStore,
};
use tracing::debug;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    wal_mode: bool,
    policy: RetentionPolicy,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            wal_mode: true,
            policy: RetentionPolicy::default(),
        }
    }

    pub fn with_wal_mode(mut self, enabled: bool) -> Self {
        self.wal_mode = enabled;
        self
    }

    /// Retention rules used by [`TestHarness::retention`].
    pub fn with_retention_policy(mut self, policy: RetentionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Open a database in a fresh temp directory and start the stores.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(self) -> Result<TestHarness, MarqueeError> {
        let temp_dir = tempfile::TempDir::new().map_err(MarqueeError::storage)?;
        let db_path = temp_dir.path().join("marquee-test.db");
        let config = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: self.wal_mode,
            ..StorageConfig::default()
        };
        let db = Database::open_with(&config).await?;

        let ingest = IngestStore::new(db.clone());
        let working = WorkingStore::new(db.clone());
        let access = Arc::new(StoreAccess::new(ingest.clone(), working.clone())?);
        let retention = RetentionRunner::new(ingest.clone(), working.clone(), self.policy);
        debug!(path = %config.database_path, "test harness ready");

        Ok(TestHarness {
            db,
            ingest,
            working,
            access,
            retention,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete storage stack over a temp database.
///
/// The database file is removed when the harness is dropped.
pub struct TestHarness {
    pub db: Database,
    pub ingest: IngestStore,
    pub working: WorkingStore,
    pub access: Arc<StoreAccess>,
    pub retention: RetentionRunner,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default settings and no retention rules.
    pub async fn new() -> Result<Self, MarqueeError> {
        Self::builder().build().await
    }

    /// Run `f` against the adapter on a blocking thread, so it may use the
    /// adapter's blocking reads.
    pub async fn blocking<T, F>(&self, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&StoreAccess) -> T + Send + 'static,
    {
        let access = self.access.clone();
        match tokio::task::spawn_blocking(move || f(&access)).await {
            Ok(value) => value,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    /// Move `modified_at` of an ingest record `by` into the past.
    pub async fn backdate_ingest(&self, uuid: &str, by: TimeDelta) {
        self.backdate("ingest_messages", "message_uuid", uuid, by).await;
    }

    /// Move `modified_at` of a working record `by` into the past.
    pub async fn backdate_working(&self, uuid: &str, by: TimeDelta) {
        self.backdate("working_messages", "msg_uuid", uuid, by).await;
    }

    async fn backdate(&self, table: &'static str, key: &'static str, uuid: &str, by: TimeDelta) {
        let at = format_timestamp(&(now() - by));
        let uuid = uuid.to_string();
        let changed = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    &format!("UPDATE {table} SET modified_at = ?1 WHERE {key} = ?2"),
                    rusqlite::params![at, uuid],
                )
            })
            .await
            .unwrap_or_default();
        assert_eq!(changed, 1, "backdate matched no {table} row");
    }

    /// Drain the adapter and close the database.
    pub async fn shutdown(self) -> Result<(), MarqueeError> {
        self.access.shutdown().await;
        self.db.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_storage::WorkingStatus;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn harness_wires_stores_to_one_database() {
        let harness = TestHarness::new().await.unwrap();
        harness.access.create_working("h1", "{}", now(), WorkingStatus::New);
        harness.access.flush().await;
        assert!(harness.working.exists_by_uuid("h1").await.unwrap());

        let seen = harness.blocking(|access| access.working_exists("h1")).await;
        assert!(seen);
        harness.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backdate_moves_modified_at() {
        let harness = TestHarness::builder().with_wal_mode(false).build().await.unwrap();
        let record = harness.ingest.ingest(r#"{"b":1}"#, now()).await.unwrap();
        harness
            .backdate_ingest(&record.message_uuid, TimeDelta::days(1))
            .await;
        let found = harness
            .ingest
            .find_by_uuid(&record.message_uuid)
            .await
            .unwrap()
            .unwrap();
        assert!(found.modified_at < record.modified_at - TimeDelta::hours(23));
        harness.shutdown().await.unwrap();
    }
}
