// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamp representation shared by both record families.
//!
//! Timestamps are persisted as fixed-width ISO 8601 text with millisecond
//! precision (`2026-01-01T00:00:00.000Z`). The fixed width makes string
//! comparison in SQL equivalent to chronological comparison.

use chrono::{DateTime, SubsecRound, Utc};

/// UTC timestamp used for every record field.
pub type Timestamp = DateTime<Utc>;

/// `strftime`-style format used for persisted timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// The current time, truncated to the persisted millisecond precision.
///
/// Truncating up front keeps an in-memory record equal to the same record
/// read back from disk.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(3)
}

/// Render a timestamp in the persisted format.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a persisted timestamp (any RFC 3339 string is accepted).
pub fn parse_timestamp(s: &str) -> Result<Timestamp, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
