// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retention policy runner.
//!
//! Applies the configured age and status rules to both stores. Each rule is
//! independent: a failing rule is logged and the remaining rules still run.

use std::fmt;
use std::time::Duration;

use marquee_config::model::RetentionConfig;
use marquee_core::{MarqueeError, RelativeTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ingest::IngestStore;
use crate::models::WorkingStatus;
use crate::working::WorkingStore;

/// Parsed retention rules. `None` disables a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub ingest_processed_max_age: Option<RelativeTime>,
    pub ingest_unprocessed_max_age: Option<RelativeTime>,
    pub ingest_max_age: Option<RelativeTime>,
    pub working_max_age: Option<RelativeTime>,
    pub sweep_housekeep: bool,
}

impl RetentionPolicy {
    /// Parse the `[retention]` section. An empty expression disables its rule.
    pub fn from_config(config: &RetentionConfig) -> Result<Self, MarqueeError> {
        Ok(Self {
            ingest_processed_max_age: parse_rule(&config.ingest_processed_max_age)?,
            ingest_unprocessed_max_age: parse_rule(&config.ingest_unprocessed_max_age)?,
            ingest_max_age: parse_rule(&config.ingest_max_age)?,
            working_max_age: parse_rule(&config.working_max_age)?,
            sweep_housekeep: config.sweep_housekeep,
        })
    }
}

fn parse_rule(expression: &str) -> Result<Option<RelativeTime>, MarqueeError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Ok(None);
    }
    expression.parse().map(Some)
}

/// Rows removed by one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub ingest_processed: usize,
    pub ingest_unprocessed: usize,
    pub ingest_aged: usize,
    pub working_aged: usize,
    pub housekeep_swept: usize,
    /// Rules that failed during this pass.
    pub failed_rules: Vec<&'static str>,
}

impl RetentionReport {
    pub fn total(&self) -> usize {
        self.ingest_processed
            + self.ingest_unprocessed
            + self.ingest_aged
            + self.working_aged
            + self.housekeep_swept
    }

    fn record(&mut self, rule: &'static str, result: Result<usize, MarqueeError>) -> usize {
        match result {
            Ok(n) => n,
            Err(e) => {
                warn!(rule, error = %e, "retention rule failed");
                self.failed_rules.push(rule);
                0
            }
        }
    }
}

impl fmt::Display for RetentionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ingest processed:   {}", self.ingest_processed)?;
        writeln!(f, "ingest unprocessed: {}", self.ingest_unprocessed)?;
        writeln!(f, "ingest aged out:    {}", self.ingest_aged)?;
        writeln!(f, "working aged out:   {}", self.working_aged)?;
        write!(f, "housekeep swept:    {}", self.housekeep_swept)?;
        if !self.failed_rules.is_empty() {
            write!(f, "\nfailed rules:       {}", self.failed_rules.join(", "))?;
        }
        Ok(())
    }
}

/// Runs a [`RetentionPolicy`] against both stores.
#[derive(Debug, Clone)]
pub struct RetentionRunner {
    ingest: IngestStore,
    working: WorkingStore,
    policy: RetentionPolicy,
}

impl RetentionRunner {
    pub fn new(ingest: IngestStore, working: WorkingStore, policy: RetentionPolicy) -> Self {
        Self {
            ingest,
            working,
            policy,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Apply every enabled rule once.
    pub async fn run_once(&self) -> RetentionReport {
        let mut report = RetentionReport::default();
        let policy = &self.policy;

        if let Some(age) = &policy.ingest_processed_max_age {
            let result = self.ingest.delete_processed_older_than(age).await;
            report.ingest_processed = report.record("ingest_processed_max_age", result);
        }
        if let Some(age) = &policy.ingest_unprocessed_max_age {
            let result = self.ingest.delete_unprocessed_older_than(age).await;
            report.ingest_unprocessed = report.record("ingest_unprocessed_max_age", result);
        }
        if let Some(age) = &policy.ingest_max_age {
            let result = self.ingest.delete_older_than(age).await;
            report.ingest_aged = report.record("ingest_max_age", result);
        }
        if let Some(age) = &policy.working_max_age {
            let result = self.working.delete_older_than(age).await;
            report.working_aged = report.record("working_max_age", result);
        }
        if policy.sweep_housekeep {
            let result = self
                .working
                .delete_all_with_status(WorkingStatus::HousekeepDelete)
                .await;
            report.housekeep_swept = report.record("sweep_housekeep", result);
        }

        if report.total() > 0 {
            info!(
                deleted = report.total(),
                ingest_processed = report.ingest_processed,
                ingest_unprocessed = report.ingest_unprocessed,
                ingest_aged = report.ingest_aged,
                working_aged = report.working_aged,
                housekeep_swept = report.housekeep_swept,
                "retention pass complete"
            );
        } else {
            debug!("retention pass complete, nothing to delete");
        }
        report
    }

    /// Run [`run_once`](Self::run_once) every `period` until `cancel` fires.
    ///
    /// The first pass runs immediately.
    pub fn spawn(self, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.run_once().await;
                    }
                    _ = cancel.cancelled() => {
                        info!("retention task shutting down");
                        break;
                    }
                }
            }
        })
    }
}
