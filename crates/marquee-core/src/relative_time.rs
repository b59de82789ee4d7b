// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relative-time expressions for age-based retention rules.
//!
//! An expression is a signed integer followed by a unit, e.g. `-2 hours`,
//! `-1 months`, `+30 seconds`. The vocabulary matches SQLite date modifiers:
//! seconds, minutes, hours, days, weeks, and months (singular or plural,
//! case-insensitive). An unsigned amount is positive.
//!
//! Applying an expression to an instant offsets it by the signed amount, so
//! `-2 hours` applied to "now" yields the instant two hours ago.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, TimeDelta};
use strum::{Display, EnumString};

use crate::error::MarqueeError;
use crate::time::Timestamp;

/// Years whose timestamps keep the fixed-width text encoding.
const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Unit of a relative-time expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum TimeUnit {
    #[strum(to_string = "seconds", serialize = "second")]
    Seconds,
    #[strum(to_string = "minutes", serialize = "minute")]
    Minutes,
    #[strum(to_string = "hours", serialize = "hour")]
    Hours,
    #[strum(to_string = "days", serialize = "day")]
    Days,
    #[strum(to_string = "weeks", serialize = "week")]
    Weeks,
    #[strum(to_string = "months", serialize = "month")]
    Months,
}

/// A parsed relative-time expression such as `-2 hours`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelativeTime {
    amount: i64,
    unit: TimeUnit,
}

impl RelativeTime {
    pub fn new(amount: i64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Offset `base` by this expression.
    ///
    /// Month arithmetic is calendar-aware (clamped to the end of shorter
    /// months); every other unit is a fixed duration. Results outside years
    /// 0000 to 9999 are rejected, since stored timestamps only order
    /// correctly as four-digit years.
    pub fn apply_to(&self, base: Timestamp) -> Result<Timestamp, MarqueeError> {
        let shifted = match self.unit {
            TimeUnit::Months => {
                let months = u32::try_from(self.amount.unsigned_abs())
                    .map_err(|_| self.out_of_range())?;
                if self.amount < 0 {
                    base.checked_sub_months(Months::new(months))
                } else {
                    base.checked_add_months(Months::new(months))
                }
            }
            _ => {
                let delta = self.as_delta().ok_or_else(|| self.out_of_range())?;
                base.checked_add_signed(delta)
            }
        };
        shifted
            .filter(|t| STORABLE_YEARS.contains(&t.year()))
            .ok_or_else(|| self.out_of_range())
    }

    fn as_delta(&self) -> Option<TimeDelta> {
        match self.unit {
            TimeUnit::Seconds => TimeDelta::try_seconds(self.amount),
            TimeUnit::Minutes => TimeDelta::try_minutes(self.amount),
            TimeUnit::Hours => TimeDelta::try_hours(self.amount),
            TimeUnit::Days => TimeDelta::try_days(self.amount),
            TimeUnit::Weeks => TimeDelta::try_weeks(self.amount),
            TimeUnit::Months => None,
        }
    }

    fn out_of_range(&self) -> MarqueeError {
        MarqueeError::InvalidExpression {
            expression: self.to_string(),
            reason: "offset is out of the representable time range".to_string(),
        }
    }
}

impl fmt::Display for RelativeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+} {}", self.amount, self.unit)
    }
}

impl FromStr for RelativeTime {
    type Err = MarqueeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| MarqueeError::InvalidExpression {
            expression: s.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = s.split_whitespace();
        let (Some(amount), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid("expected `<signed integer> <unit>`, e.g. `-2 hours`"));
        };

        let amount: i64 = amount
            .parse()
            .map_err(|_| invalid("amount must be a signed integer"))?;
        let unit = TimeUnit::from_str(unit).map_err(|_| {
            invalid("unit must be one of seconds, minutes, hours, days, weeks, months")
        })?;

        Ok(Self { amount, unit })
    }
}
