// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Marquee message stores.

use strum::Display;
use thiserror::Error;

/// Why an inbound message was refused by the ingest store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RejectReason {
    /// An identical payload is already stored.
    Duplicate,
}

/// The primary error type returned by every store operation.
#[derive(Debug, Error)]
pub enum MarqueeError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The underlying SQLite database failed to open or execute a statement.
    #[error("storage unavailable: {source}")]
    StorageUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A uniqueness constraint was violated (message identifier or content hash).
    #[error("duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },

    /// The operation referenced an identifier that is not in the store.
    #[error("{table} record not found: {key}")]
    NotFound { table: &'static str, key: String },

    /// Ingest-time content dedup refused the payload.
    #[error("message rejected: {reason}")]
    Rejected { reason: RejectReason },

    /// A relative-time expression could not be parsed or applied.
    #[error("invalid relative-time expression `{expression}`: {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MarqueeError {
    /// Wrap any error as [`MarqueeError::StorageUnavailable`].
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        MarqueeError::StorageUnavailable {
            source: source.into(),
        }
    }

    /// Returns `true` for outcomes caused by the upstream resending a message.
    ///
    /// Duplicate sends are a known, recurring condition, so these are logged
    /// at a lower level than real failures.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            MarqueeError::DuplicateKey { .. } | MarqueeError::Rejected { .. }
        )
    }
}
