// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous access to the message stores from non-async callers.
//!
//! Writes are fire-and-forget: each call enqueues a [`WriteOp`] on an
//! unbounded FIFO drained by a single writer task, so writes issued through
//! one [`StoreAccess`] are applied in issuance order. Failures are logged,
//! never returned.
//!
//! Reads block the calling thread. A read first enqueues a barrier behind
//! every pending write, then runs on the runtime and hands its result back
//! over a oneshot channel, so it observes all writes issued before it.
//!
//! Blocking reads must not be called from a thread that is driving the
//! runtime (use `spawn_blocking` or a plain thread). Async code should call
//! the stores directly through [`StoreAccess::ingest`] and
//! [`StoreAccess::working`].

use std::future::Future;

use marquee_core::{MarqueeError, RelativeTime, Timestamp};
use strum::IntoStaticStr;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::database::Database;
use crate::ingest::IngestStore;
use crate::models::{IngestRecord, IngestStatus, SortDirection, WorkingRecord, WorkingStatus};
use crate::working::WorkingStore;

/// A write applied by the background writer.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum WriteOp {
    Ingest {
        payload_json: String,
        received_at: Timestamp,
    },
    MarkForwarded {
        uuid: String,
    },
    MarkProcessed {
        uuid: String,
    },
    MarkProcessingError {
        uuid: String,
    },
    DeleteIngestProcessedOlderThan(RelativeTime),
    DeleteIngestUnprocessedOlderThan(RelativeTime),
    DeleteIngestOlderThan(RelativeTime),
    CreateWorking {
        uuid: String,
        payload_json: String,
        received_at: Timestamp,
        status: WorkingStatus,
    },
    UpdateWorkingPayload {
        uuid: String,
        payload_json: String,
    },
    UpdateWorkingMetadata {
        uuid: String,
        meta_json: String,
    },
    UpdateWorkingStatus {
        uuid: String,
        status: WorkingStatus,
    },
    DeleteWorking {
        uuid: String,
    },
    DeleteWorkingWithStatus(WorkingStatus),
    DeleteWorkingOlderThan(RelativeTime),
    DeleteAllWorking,
}

enum Command {
    Write(WriteOp),
    /// Completed once every command queued before it has been handled.
    Barrier(oneshot::Sender<()>),
    /// Stop accepting commands; queued ones are still drained.
    Close,
}

/// Fire-and-forget writes and blocking reads over both stores.
pub struct StoreAccess {
    ingest: IngestStore,
    working: WorkingStore,
    tx: mpsc::UnboundedSender<Command>,
    runtime: Handle,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for StoreAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAccess")
            .field("ingest", &self.ingest)
            .field("working", &self.working)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl StoreAccess {
    /// Start the writer task on the current runtime.
    pub fn new(ingest: IngestStore, working: WorkingStore) -> Result<Self, MarqueeError> {
        let runtime = Handle::try_current()
            .map_err(|e| MarqueeError::Internal(format!("store access needs a tokio runtime: {e}")))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = runtime.spawn(run_writer(ingest.clone(), working.clone(), rx).in_current_span());
        debug!("store writer started");
        Ok(Self {
            ingest,
            working,
            tx,
            runtime,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Build both stores over `db` and start the writer task.
    pub fn open(db: &Database) -> Result<Self, MarqueeError> {
        Self::new(IngestStore::new(db.clone()), WorkingStore::new(db.clone()))
    }

    pub fn ingest(&self) -> &IngestStore {
        &self.ingest
    }

    pub fn working(&self) -> &WorkingStore {
        &self.working
    }

    /// Enqueue a write. Returns immediately.
    pub fn submit(&self, op: WriteOp) {
        if let Err(mpsc::error::SendError(Command::Write(op))) = self.tx.send(Command::Write(op)) {
            let op: &'static str = (&op).into();
            warn!(op, "store access is shut down, write dropped");
        }
    }

    pub fn ingest_message(&self, payload_json: impl Into<String>, received_at: Timestamp) {
        self.submit(WriteOp::Ingest {
            payload_json: payload_json.into(),
            received_at,
        });
    }

    pub fn mark_forwarded(&self, uuid: impl Into<String>) {
        self.submit(WriteOp::MarkForwarded { uuid: uuid.into() });
    }

    pub fn mark_processed(&self, uuid: impl Into<String>) {
        self.submit(WriteOp::MarkProcessed { uuid: uuid.into() });
    }

    pub fn mark_processing_error(&self, uuid: impl Into<String>) {
        self.submit(WriteOp::MarkProcessingError { uuid: uuid.into() });
    }

    pub fn delete_ingest_processed_older_than(&self, age: RelativeTime) {
        self.submit(WriteOp::DeleteIngestProcessedOlderThan(age));
    }

    pub fn delete_ingest_unprocessed_older_than(&self, age: RelativeTime) {
        self.submit(WriteOp::DeleteIngestUnprocessedOlderThan(age));
    }

    pub fn delete_ingest_older_than(&self, age: RelativeTime) {
        self.submit(WriteOp::DeleteIngestOlderThan(age));
    }

    pub fn create_working(
        &self,
        uuid: impl Into<String>,
        payload_json: impl Into<String>,
        received_at: Timestamp,
        status: WorkingStatus,
    ) {
        self.submit(WriteOp::CreateWorking {
            uuid: uuid.into(),
            payload_json: payload_json.into(),
            received_at,
            status,
        });
    }

    pub fn update_working_payload(&self, uuid: impl Into<String>, payload_json: impl Into<String>) {
        self.submit(WriteOp::UpdateWorkingPayload {
            uuid: uuid.into(),
            payload_json: payload_json.into(),
        });
    }

    pub fn update_working_metadata(&self, uuid: impl Into<String>, meta_json: impl Into<String>) {
        self.submit(WriteOp::UpdateWorkingMetadata {
            uuid: uuid.into(),
            meta_json: meta_json.into(),
        });
    }

    pub fn update_working_status(&self, uuid: impl Into<String>, status: WorkingStatus) {
        self.submit(WriteOp::UpdateWorkingStatus {
            uuid: uuid.into(),
            status,
        });
    }

    pub fn delete_working(&self, uuid: impl Into<String>) {
        self.submit(WriteOp::DeleteWorking { uuid: uuid.into() });
    }

    pub fn delete_working_with_status(&self, status: WorkingStatus) {
        self.submit(WriteOp::DeleteWorkingWithStatus(status));
    }

    pub fn delete_working_older_than(&self, age: RelativeTime) {
        self.submit(WriteOp::DeleteWorkingOlderThan(age));
    }

    pub fn delete_all_working(&self) {
        self.submit(WriteOp::DeleteAllWorking);
    }

    /// Wait until every write enqueued so far has been applied.
    pub async fn flush(&self) {
        // A closed queue has nothing left to wait for.
        let _ = self.barrier().await;
    }

    /// Blocking variant of [`flush`](Self::flush).
    pub fn flush_blocking(&self) {
        let _ = self.barrier().blocking_recv();
    }

    /// Close the queue, apply every pending write, and join the writer task.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Close);
        let writer = self.writer.lock().await.take();
        if let Some(writer) = writer
            && let Err(e) = writer.await
        {
            error!(error = %e, "store writer task failed");
        }
        info!("store access shut down");
    }

    fn barrier(&self) -> oneshot::Receiver<()> {
        let (done, wait) = oneshot::channel();
        // If the writer is gone the sender is dropped and `wait` resolves at once.
        let _ = self.tx.send(Command::Barrier(done));
        wait
    }

    /// Run `read` on the runtime after all pending writes, blocking the
    /// calling thread for its result.
    ///
    /// Errors are logged and replaced by `T::default()`.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context.
    pub fn read_blocking<T, F, Fut>(&self, what: &'static str, read: F) -> T
    where
        T: Default + Send + 'static,
        F: FnOnce(IngestStore, WorkingStore) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, MarqueeError>> + Send + 'static,
    {
        let barrier = self.barrier();
        let ingest = self.ingest.clone();
        let working = self.working.clone();
        let (reply, result) = oneshot::channel();
        self.runtime.spawn(async move {
            let _ = barrier.await;
            let _ = reply.send(read(ingest, working).await);
        });

        match result.blocking_recv() {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                error!(read = what, error = %e, "blocking read failed");
                T::default()
            }
            Err(_) => {
                error!(read = what, "blocking read abandoned by runtime");
                T::default()
            }
        }
    }

    pub fn find_ingest_by_uuid(&self, uuid: impl Into<String>) -> Option<IngestRecord> {
        let uuid = uuid.into();
        self.read_blocking("find_ingest_by_uuid", move |ingest, _| async move {
            ingest.find_by_uuid(&uuid).await
        })
    }

    pub fn find_ingest_with_status(&self, status: IngestStatus) -> Vec<IngestRecord> {
        self.read_blocking("find_ingest_with_status", move |ingest, _| async move {
            ingest.find_with_status(status).await
        })
    }

    pub fn find_unprocessed(&self) -> Vec<IngestRecord> {
        self.read_blocking("find_unprocessed", |ingest, _| async move {
            ingest.find_unprocessed().await
        })
    }

    pub fn find_processed(&self) -> Vec<IngestRecord> {
        self.read_blocking("find_processed", |ingest, _| async move {
            ingest.find_processed().await
        })
    }

    pub fn find_containing(&self, substring: impl Into<String>) -> Vec<IngestRecord> {
        let substring = substring.into();
        self.read_blocking("find_containing", move |ingest, _| async move {
            ingest.find_containing(&substring).await
        })
    }

    pub fn find_matching_whole(&self, text: impl Into<String>) -> Vec<IngestRecord> {
        let text = text.into();
        self.read_blocking("find_matching_whole", move |ingest, _| async move {
            ingest.find_matching_whole(&text).await
        })
    }

    pub fn count_matching_whole(&self, text: impl Into<String>) -> usize {
        let text = text.into();
        self.read_blocking("count_matching_whole", move |ingest, _| async move {
            ingest.count_matching_whole(&text).await
        })
    }

    pub fn find_working_by_uuid(&self, uuid: impl Into<String>) -> Option<WorkingRecord> {
        let uuid = uuid.into();
        self.read_blocking("find_working_by_uuid", move |_, working| async move {
            working.find_by_uuid(&uuid).await
        })
    }

    pub fn working_exists(&self, uuid: impl Into<String>) -> bool {
        let uuid = uuid.into();
        self.read_blocking("working_exists", move |_, working| async move {
            working.exists_by_uuid(&uuid).await
        })
    }

    pub fn find_working_with_status(&self, status: WorkingStatus) -> Vec<WorkingRecord> {
        self.read_blocking("find_working_with_status", move |_, working| async move {
            working.find_with_status(status).await
        })
    }

    pub fn find_working_sorted_by_received_at(&self, direction: SortDirection) -> Vec<WorkingRecord> {
        self.read_blocking("find_working_sorted_by_received_at", move |_, working| async move {
            working.find_all_sorted_by_received_at(direction).await
        })
    }
}

async fn run_writer(
    ingest: IngestStore,
    working: WorkingStore,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut applied = 0u64;
    while let Some(command) = rx.recv().await {
        match command {
            Command::Write(op) => {
                apply(&ingest, &working, op).await;
                applied += 1;
            }
            Command::Barrier(done) => {
                let _ = done.send(());
            }
            Command::Close => rx.close(),
        }
    }
    debug!(applied, "store writer drained");
}

async fn apply(ingest: &IngestStore, working: &WorkingStore, op: WriteOp) {
    let name: &'static str = (&op).into();
    let result = match op {
        WriteOp::Ingest {
            payload_json,
            received_at,
        } => ingest.ingest(&payload_json, received_at).await.map(drop),
        WriteOp::MarkForwarded { uuid } => ingest.mark_forwarded(&uuid).await.map(drop),
        WriteOp::MarkProcessed { uuid } => ingest.mark_processed(&uuid).await.map(drop),
        WriteOp::MarkProcessingError { uuid } => {
            ingest.mark_processing_error(&uuid).await.map(drop)
        }
        WriteOp::DeleteIngestProcessedOlderThan(age) => {
            ingest.delete_processed_older_than(&age).await.map(drop)
        }
        WriteOp::DeleteIngestUnprocessedOlderThan(age) => {
            ingest.delete_unprocessed_older_than(&age).await.map(drop)
        }
        WriteOp::DeleteIngestOlderThan(age) => ingest.delete_older_than(&age).await.map(drop),
        WriteOp::CreateWorking {
            uuid,
            payload_json,
            received_at,
            status,
        } => working
            .create(&uuid, &payload_json, received_at, status)
            .await
            .map(drop),
        WriteOp::UpdateWorkingPayload { uuid, payload_json } => {
            working.update_payload(&uuid, &payload_json).await
        }
        WriteOp::UpdateWorkingMetadata { uuid, meta_json } => {
            working.update_metadata(&uuid, &meta_json).await
        }
        WriteOp::UpdateWorkingStatus { uuid, status } => working.update_status(&uuid, status).await,
        WriteOp::DeleteWorking { uuid } => working.delete_by_uuid(&uuid).await.map(drop),
        WriteOp::DeleteWorkingWithStatus(status) => {
            working.delete_all_with_status(status).await.map(drop)
        }
        WriteOp::DeleteWorkingOlderThan(age) => working.delete_older_than(&age).await.map(drop),
        WriteOp::DeleteAllWorking => working.delete_all().await.map(drop),
    };

    match result {
        Ok(()) => {}
        Err(e) if e.is_benign() => info!(op = name, error = %e, "background write skipped"),
        Err(e) => error!(op = name, error = %e, "background write failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use marquee_core::now;
    use tracing_test::traced_test;

    async fn access() -> Arc<StoreAccess> {
        let db = Database::open_in_memory().await.unwrap();
        Arc::new(StoreAccess::open(&db).unwrap())
    }

    /// Run a closure that performs blocking reads off the runtime threads.
    async fn off_runtime<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        tokio::task::spawn_blocking(f).await.unwrap()
    }

    #[test]
    fn write_op_names_are_snake_case() {
        let name: &'static str = (&WriteOp::DeleteAllWorking).into();
        assert_eq!(name, "delete_all_working");
        let op = WriteOp::MarkForwarded { uuid: "u".into() };
        let name: &'static str = (&op).into();
        assert_eq!(name, "mark_forwarded");
    }

    #[test]
    fn new_outside_runtime_is_an_error() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let db = rt.block_on(Database::open_in_memory()).unwrap();
        let err = StoreAccess::open(&db).unwrap_err();
        assert!(matches!(err, MarqueeError::Internal(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_read_sees_prior_writes() {
        let access = access().await;
        let t0 = now();
        let reader = access.clone();
        let found = off_runtime(move || {
            reader.create_working("uuid-1", r#"{"a":1}"#, t0, WorkingStatus::New);
            reader.update_working_status("uuid-1", WorkingStatus::CopiedToRAM);
            reader.find_working_by_uuid("uuid-1")
        })
        .await
        .unwrap();
        assert_eq!(found.status, WorkingStatus::CopiedToRAM);
        assert_eq!(found.received_at, t0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn writes_from_many_threads_are_all_visible() {
        let access = access().await;
        let writers: Vec<_> = (0..16)
            .map(|i| {
                let access = access.clone();
                std::thread::spawn(move || {
                    access.create_working(format!("uuid-{i}"), "{}", now(), WorkingStatus::New);
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let reader = access.clone();
        let all = off_runtime(move || {
            reader.find_working_sorted_by_received_at(SortDirection::Ascending)
        })
        .await;
        assert_eq!(all.len(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[traced_test]
    async fn duplicate_writes_are_logged_not_propagated() {
        let access = access().await;
        access.ingest_message(r#"{"dup":true}"#, now());
        access.ingest_message(r#"{"dup":true}"#, now());
        access.create_working("w", "{}", now(), WorkingStatus::New);
        access.create_working("w", "{}", now(), WorkingStatus::New);
        access.flush().await;

        assert_eq!(access.ingest().count_matching_whole(r#"{"dup":true}"#).await.unwrap(), 1);
        assert!(logs_contain("background write skipped"));
        assert!(!logs_contain("background write failed"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[traced_test]
    async fn missing_record_update_is_logged_as_failure() {
        let access = access().await;
        access.update_working_metadata("ghost", r#"{"repeats":1}"#);
        access.flush().await;
        assert!(logs_contain("background write failed"));
        assert!(!access.working().exists_by_uuid("ghost").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn read_failure_yields_default() {
        let access = access().await;
        let reader = access.clone();
        let value: Vec<IngestRecord> = off_runtime(move || {
            reader.read_blocking("always_fails", |_, _| async {
                Err(MarqueeError::Internal("boom".into()))
            })
        })
        .await;
        assert!(value.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ingest_reads_through_adapter() {
        let access = access().await;
        access.ingest_message(r#"{"text":"Evacuate"}"#, now());
        access.ingest_message(r#"{"text":"Lunch"}"#, now());

        let reader = access.clone();
        let (unprocessed, containing, whole) = off_runtime(move || {
            let unprocessed = reader.find_unprocessed();
            let uuid = unprocessed[0].message_uuid.clone();
            reader.mark_processed(uuid.clone());
            let containing = reader.find_containing("Evac");
            let whole = reader.count_matching_whole(r#"{"text":"Lunch"}"#);
            assert_eq!(reader.find_processed().len(), 1);
            assert_eq!(
                reader.find_ingest_by_uuid(uuid).map(|r| r.status),
                Some(IngestStatus::Processed)
            );
            (unprocessed, containing, whole)
        })
        .await;
        assert_eq!(unprocessed.len(), 2);
        assert_eq!(containing.len(), 1);
        assert_eq!(whole, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_drains_queue_and_drops_later_writes() {
        let access = access().await;
        for i in 0..50 {
            access.create_working(format!("u{i}"), "{}", now(), WorkingStatus::New);
        }
        access.shutdown().await;
        assert_eq!(
            access.working().records().count_where(crate::Filter::All).await.unwrap(),
            50
        );

        access.create_working("late", "{}", now(), WorkingStatus::New);
        access.flush().await;
        assert!(!access.working().exists_by_uuid("late").await.unwrap());
        // Second shutdown is harmless.
        access.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn flush_blocking_waits_for_writes() {
        let access = access().await;
        let writer = access.clone();
        off_runtime(move || {
            writer.create_working("fb", "{}", now(), WorkingStatus::New);
            writer.delete_working_with_status(WorkingStatus::New);
            writer.flush_blocking();
        })
        .await;
        assert!(!access.working().exists_by_uuid("fb").await.unwrap());
    }
}
