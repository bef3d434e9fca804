//! Reminder utility functions
//!
//! Date parsing and argument coercion shared by the reminder tools.

use chrono::{NaiveDateTime, TimeDelta};

use crate::error::ReminderError;

/// Accepted input formats, tried in order
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d-%m-%Y %H:%M",
    "%m/%d/%Y %H:%M",
];

/// Parse a user-supplied date and time
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, ReminderError> {
    let trimmed = input.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ReminderError::InvalidDatetime {
            input: input.to_string(),
        })
}

/// Parse an hour count given as text (`"24"`, `" 6 "`, `"-1"`)
pub fn parse_hours(input: &str) -> Result<i64, ReminderError> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| ReminderError::InvalidHours)
}

/// Interpret a textual flag; only `true` (any case) is true
pub fn parse_flag(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("true")
}

/// Length of `delta` in hours, rounded to one decimal place
pub fn hours_rounded(delta: TimeDelta) -> f64 {
    let hours = delta.num_milliseconds() as f64 / 3_600_000.0;
    (hours * 10.0).round() / 10.0
}
