//! Reminder type definitions
//!
//! These types are serialized straight into tool results.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single reminder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// Decimal id, unique for the lifetime of the process
    pub id: String,

    /// Short title
    pub title: String,

    /// Free-form description, may be empty
    #[serde(default)]
    pub description: String,

    /// When the reminder is due (local time)
    pub datetime: NaiveDateTime,

    /// Whether the reminder has been completed
    #[serde(default)]
    pub completed: bool,

    /// When the reminder was created (local time)
    pub created_at: NaiveDateTime,

    /// When the reminder was completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDateTime>,
}

/// A pending reminder inside the requested window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingReminder {
    #[serde(flatten)]
    pub reminder: Reminder,

    /// Hours until due, rounded to one decimal
    pub hours_until: f64,
}

/// A pending reminder whose time has passed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverdueReminder {
    #[serde(flatten)]
    pub reminder: Reminder,

    /// Hours past due, rounded to one decimal
    pub hours_overdue: f64,
}

/// Counters over the whole reminder book
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderStats {
    pub total_reminders: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
    pub upcoming_24h: usize,
}
