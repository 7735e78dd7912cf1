//! Poll interval windows
//!
//! Each scheduled pass looks at rows changed in `[now - lower, now - upper]`.
//! The lower bound reaches one minute past a full poll cycle to absorb
//! scheduler jitter; the upper bound skips the last minute so rows still being
//! written by upstream consumers are picked up by the next pass instead.

use chrono::{DateTime, Utc};
use spm_common::time::minutes_before;
use std::fmt;

/// Minutes excluded at the young end of every window
pub const UPPER_BOUND_AGE_MINUTES: i64 = 1;

/// Age bounds, in minutes, of one poll window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalWindow {
    pub lower_bound_age: i64,
    pub upper_bound_age: i64,
}

impl IntervalWindow {
    /// Detection window for a poll interval of `interval_minutes`: `T + 1` .. `1`
    pub fn detection(interval_minutes: u32) -> Self {
        Self {
            lower_bound_age: i64::from(interval_minutes) + 1,
            upper_bound_age: UPPER_BOUND_AGE_MINUTES,
        }
    }

    /// Reverify window, covering the two previous cycles: `2T + 1` .. `1`
    pub fn reverify(interval_minutes: u32) -> Self {
        Self {
            lower_bound_age: i64::from(interval_minutes) * 2 + 1,
            upper_bound_age: UPPER_BOUND_AGE_MINUTES,
        }
    }

    /// Interval literal of the look-back, e.g. `"10 mins"`
    pub fn lower_bound_label(&self) -> String {
        format!("{} mins", self.lower_bound_age)
    }

    /// Interval literal of the young cutoff, e.g. `"1 mins"`
    pub fn upper_bound_label(&self) -> String {
        format!("{} mins", self.upper_bound_age)
    }

    /// Absolute `(from, to)` bounds relative to `now`
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            minutes_before(now, self.lower_bound_age),
            minutes_before(now, self.upper_bound_age),
        )
    }
}

impl fmt::Display for IntervalWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.lower_bound_label(), self.upper_bound_label())
    }
}
