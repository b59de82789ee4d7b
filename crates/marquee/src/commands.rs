// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot commands: `ingest`, `list`, and `sweep`.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use marquee_config::MarqueeConfig;
use marquee_core::{MarqueeError, now};
use marquee_storage::models::{ingest_columns, working_columns};
use marquee_storage::{
    Database, Filter, IngestStatus, IngestStore, RetentionPolicy, RetentionRunner, WorkingStatus,
    WorkingStore,
};
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::StoreKind;

/// Result of ingesting one payload from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored under this uuid.
    Stored(String),
    /// An identical payload is already stored.
    Duplicate,
}

/// Runs the `marquee ingest` command.
pub async fn run_ingest(config: &MarqueeConfig, file: Option<&Path>) -> Result<(), MarqueeError> {
    let payload = read_payload(file)?;
    let db = Database::open_with(&config.storage).await?;
    let outcome = ingest_payload(&IngestStore::new(db.clone()), &payload).await;
    db.close().await?;

    match outcome? {
        IngestOutcome::Stored(uuid) => println!("{uuid}"),
        IngestOutcome::Duplicate => println!("duplicate"),
    }
    Ok(())
}

/// Ingest `payload` received now, folding the duplicate rejection into
/// [`IngestOutcome::Duplicate`].
pub async fn ingest_payload(store: &IngestStore, payload: &str) -> Result<IngestOutcome, MarqueeError> {
    match store.ingest(payload, now()).await {
        Ok(record) => Ok(IngestOutcome::Stored(record.message_uuid)),
        Err(MarqueeError::Rejected { .. }) => Ok(IngestOutcome::Duplicate),
        Err(e) => Err(e),
    }
}

fn read_payload(file: Option<&Path>) -> Result<String, MarqueeError> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| MarqueeError::Internal(format!("cannot read {}: {e}", path.display())))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| MarqueeError::Internal(format!("cannot read stdin: {e}")))?;
            buf
        }
    };
    normalize_payload(&raw)
}

/// Strip the trailing newline a file or pipe adds and require valid JSON.
fn normalize_payload(raw: &str) -> Result<String, MarqueeError> {
    let payload = raw.trim_end_matches(['\n', '\r']);
    serde_json::from_str::<serde_json::Value>(payload)
        .map_err(|e| MarqueeError::Internal(format!("payload is not valid JSON: {e}")))?;
    Ok(payload.to_string())
}

/// Runs the `marquee list` command.
pub async fn run_list(
    config: &MarqueeConfig,
    store: StoreKind,
    status: Option<&str>,
    containing: Option<&str>,
) -> Result<(), MarqueeError> {
    let db = Database::open_preserving(&config.storage).await?;
    let lines = list_lines(&db, store, status, containing).await;
    db.close().await?;

    for line in lines? {
        println!("{line}");
    }
    Ok(())
}

/// Matching records of one store, serialized one JSON object per line.
pub async fn list_lines(
    db: &Database,
    store: StoreKind,
    status: Option<&str>,
    containing: Option<&str>,
) -> Result<Vec<String>, MarqueeError> {
    match store {
        StoreKind::Ingest => {
            let mut filter = Filter::All;
            if let Some(status) = status {
                let status: IngestStatus = parse_status(status)?;
                filter = filter.and(Filter::text(ingest_columns::STATUS, status.to_string()));
            }
            if let Some(text) = containing {
                filter = filter.and(Filter::contains(ingest_columns::MESSAGE_JSON, text));
            }
            let records = IngestStore::new(db.clone()).records().find_where(filter).await?;
            to_json_lines(&records)
        }
        StoreKind::Working => {
            let mut filter = Filter::All;
            if let Some(status) = status {
                let status: WorkingStatus = parse_status(status)?;
                filter = filter.and(Filter::text(working_columns::STATUS, status.to_string()));
            }
            if let Some(text) = containing {
                filter = filter.and(Filter::contains(working_columns::MSG_JSON, text));
            }
            let records = WorkingStore::new(db.clone()).records().find_where(filter).await?;
            to_json_lines(&records)
        }
    }
}

fn parse_status<S>(value: &str) -> Result<S, MarqueeError>
where
    S: FromStr + IntoEnumIterator + std::fmt::Display,
{
    S::from_str(value).map_err(|_| {
        let valid = S::iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ");
        MarqueeError::Config(format!("unknown status `{value}` (valid: {valid})"))
    })
}

fn to_json_lines<T: Serialize>(records: &[T]) -> Result<Vec<String>, MarqueeError> {
    records
        .iter()
        .map(|r| serde_json::to_string(r).map_err(|e| MarqueeError::Internal(e.to_string())))
        .collect()
}

/// Runs the `marquee sweep` command.
///
/// Applies the configured rules even when the periodic sweep is disabled.
pub async fn run_sweep(config: &MarqueeConfig) -> Result<(), MarqueeError> {
    let policy = RetentionPolicy::from_config(&config.retention)?;
    let db = Database::open_with(&config.storage).await?;
    let runner = RetentionRunner::new(IngestStore::new(db.clone()), WorkingStore::new(db.clone()), policy);
    let report = runner.run_once().await;
    db.close().await?;

    println!("{report}");
    println!("total removed:      {}", report.total());
    if report.failed_rules.is_empty() {
        Ok(())
    } else {
        Err(MarqueeError::Internal(format!(
            "{} retention rule(s) failed",
            report.failed_rules.len()
        )))
    }
}
