// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `marquee status` command implementation.
//!
//! Opens the configured database and shows how many records each store
//! holds per status.

use std::io::IsTerminal;

use marquee_config::MarqueeConfig;
use marquee_core::MarqueeError;
use marquee_storage::{Database, IngestStore, WorkingStore};
use serde::Serialize;

/// Record count for one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: usize,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub database_path: String,
    pub ingest: Vec<StatusCount>,
    pub ingest_total: usize,
    pub working: Vec<StatusCount>,
    pub working_total: usize,
}

/// Run the `marquee status` command.
///
/// `--json` prints structured output for scripting. Colors are disabled by
/// `--plain` or when stdout is not a TTY.
pub async fn run_status(config: &MarqueeConfig, json: bool, plain: bool) -> Result<(), MarqueeError> {
    let db = Database::open_preserving(&config.storage).await?;
    let response = collect_status(&db).await;
    db.close().await?;
    let response = response?;

    if json {
        let text = serde_json::to_string_pretty(&response)
            .map_err(|e| MarqueeError::Internal(format!("failed to serialize status: {e}")))?;
        println!("{text}");
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&response, use_color);
    }
    Ok(())
}

/// Count both stores by status.
pub async fn collect_status(db: &Database) -> Result<StatusResponse, MarqueeError> {
    let ingest = IngestStore::new(db.clone()).count_by_status().await?;
    let working = WorkingStore::new(db.clone()).count_by_status().await?;

    let ingest: Vec<StatusCount> = ingest
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status.to_string(),
            count,
        })
        .collect();
    let working: Vec<StatusCount> = working
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status.to_string(),
            count,
        })
        .collect();

    Ok(StatusResponse {
        database_path: db.path().to_string(),
        ingest_total: ingest.iter().map(|c| c.count).sum(),
        ingest,
        working_total: working.iter().map(|c| c.count).sum(),
        working,
    })
}

fn print_status(response: &StatusResponse, use_color: bool) {
    println!();
    println!("  marquee status");
    println!("  {}", "-".repeat(35));
    println!("    Database: {}", response.database_path);
    print_store("Ingest", &response.ingest, response.ingest_total, use_color);
    print_store("Working", &response.working, response.working_total, use_color);
    println!();
}

fn print_store(title: &str, counts: &[StatusCount], total: usize, use_color: bool) {
    println!();
    if use_color {
        use colored::Colorize;
        println!("    {} ({total})", title.bold());
    } else {
        println!("    {title} ({total})");
    }
    for c in counts {
        if use_color && c.count > 0 {
            use colored::Colorize;
            println!("      {:<18} {}", c.status, c.count.to_string().green());
        } else {
            println!("      {:<18} {}", c.status, c.count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::now;
    use marquee_storage::WorkingStatus;

    #[tokio::test]
    async fn empty_database_reports_every_status_as_zero() {
        let db = Database::open_in_memory().await.unwrap();
        let status = collect_status(&db).await.unwrap();
        assert_eq!(status.ingest.len(), 4);
        assert_eq!(status.working.len(), 4);
        assert_eq!(status.ingest_total, 0);
        assert!(status.working.iter().all(|c| c.count == 0));
    }

    #[tokio::test]
    async fn counts_follow_status_changes() {
        let db = Database::open_in_memory().await.unwrap();
        let ingest = IngestStore::new(db.clone());
        let a = ingest.ingest(r#"{"a":1}"#, now()).await.unwrap();
        ingest.ingest(r#"{"a":2}"#, now()).await.unwrap();
        ingest.mark_processed(&a.message_uuid).await.unwrap();
        WorkingStore::new(db.clone())
            .create("w", "{}", now(), WorkingStatus::CopiedToRAM)
            .await
            .unwrap();

        let status = collect_status(&db).await.unwrap();
        assert_eq!(status.ingest_total, 2);
        assert_eq!(
            status.ingest[0],
            StatusCount {
                status: "New".to_string(),
                count: 1
            }
        );
        assert_eq!(status.ingest[2].status, "Processed");
        assert_eq!(status.ingest[2].count, 1);
        assert_eq!(status.working[1].status, "CopiedToRAM");
        assert_eq!(status.working_total, 1);
    }

    #[tokio::test]
    async fn status_response_serializes() {
        let db = Database::open_in_memory().await.unwrap();
        let status = collect_status(&db).await.unwrap();
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"ingest_total\":0"));
        assert!(json.contains("\"status\":\"HousekeepDelete\""));
    }
}
