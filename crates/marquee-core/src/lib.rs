// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Marquee message stores.
//!
//! This crate provides the error taxonomy shared by every store operation,
//! the on-disk timestamp representation, and the relative-time expressions
//! ("-2 hours", "-1 months") used by retention rules.

pub mod error;
pub mod relative_time;
pub mod time;

// Re-export key items at crate root for ergonomic imports.
pub use error::{MarqueeError, RejectReason};
pub use relative_time::{RelativeTime, TimeUnit};
pub use time::{Timestamp, format_timestamp, now, parse_timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marquee_error_has_all_variants() {
        let _config = MarqueeError::Config("test".into());
        let _storage = MarqueeError::StorageUnavailable {
            source: Box::new(std::io::Error::other("test")),
        };
        let _dup = MarqueeError::DuplicateKey {
            table: "working_messages",
            key: "uuid-1".into(),
        };
        let _missing = MarqueeError::NotFound {
            table: "working_messages",
            key: "uuid-1".into(),
        };
        let _rejected = MarqueeError::Rejected {
            reason: RejectReason::Duplicate,
        };
        let _expr = MarqueeError::InvalidExpression {
            expression: "soon".into(),
            reason: "test".into(),
        };
        let _internal = MarqueeError::Internal("test".into());
    }

    #[test]
    fn only_duplicates_are_benign() {
        assert!(
            MarqueeError::DuplicateKey {
                table: "ingest_messages",
                key: "x".into()
            }
            .is_benign()
        );
        assert!(
            MarqueeError::Rejected {
                reason: RejectReason::Duplicate
            }
            .is_benign()
        );
        assert!(
            !MarqueeError::NotFound {
                table: "ingest_messages",
                key: "x".into()
            }
            .is_benign()
        );
        assert!(!MarqueeError::Internal("boom".into()).is_benign());
    }
}
