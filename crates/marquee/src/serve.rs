// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `marquee serve` command implementation.
//!
//! Opens the database, starts the store writer, runs the retention sweep on
//! its configured interval, and waits for SIGINT/SIGTERM. On shutdown the
//! writer queue is drained and the WAL is checkpointed before exit.

use std::sync::Arc;
use std::time::Duration;

use marquee_config::MarqueeConfig;
use marquee_core::MarqueeError;
use marquee_storage::{Database, RetentionPolicy, RetentionRunner, StoreAccess};
use tracing::{info, warn};

use crate::shutdown;

/// Runs the `marquee serve` command.
pub async fn run_serve(config: MarqueeConfig) -> Result<(), MarqueeError> {
    crate::init_tracing(&config);

    info!(
        name = %config.daemon.name,
        database = %config.storage.database_path,
        "starting marquee serve"
    );

    let db = Database::open_with(&config.storage).await?;
    let access = Arc::new(StoreAccess::open(&db)?);
    let cancel = shutdown::install_signal_handler();

    let retention_task = if config.retention.enabled {
        let policy = RetentionPolicy::from_config(&config.retention)?;
        let runner = RetentionRunner::new(access.ingest().clone(), access.working().clone(), policy);
        let interval = Duration::from_secs(config.retention.interval_secs);
        info!(
            interval_secs = config.retention.interval_secs,
            "retention sweep enabled"
        );
        Some(runner.spawn(interval, cancel.clone()))
    } else {
        info!("retention sweep disabled");
        None
    };

    info!("marquee ready");
    cancel.cancelled().await;

    if let Some(task) = retention_task
        && let Err(e) = task.await
    {
        warn!(error = %e, "retention task ended abnormally");
    }

    access.shutdown().await;
    db.close().await?;
    info!("marquee stopped");
    Ok(())
}
