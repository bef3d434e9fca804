//! In-memory reminder book
//!
//! Holds every reminder created during the life of the server process.
//! All time-dependent operations take `now` so callers decide the clock.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeDelta};

use crate::error::ReminderError;
use crate::reminders::types::{OverdueReminder, Reminder, ReminderStats, UpcomingReminder};
use crate::reminders::utils::{hours_rounded, parse_datetime};

/// Reminder storage keyed by numeric id
#[derive(Debug, Default)]
pub struct ReminderBook {
    reminders: BTreeMap<u64, Reminder>,
    last_id: u64,
}

impl ReminderBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reminders, completed ones included
    pub fn len(&self) -> usize {
        self.reminders.len()
    }

    /// Whether the book holds no reminders
    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty()
    }

    /// Add a reminder due at `datetime` (see [`parse_datetime`] for formats)
    pub fn add(
        &mut self,
        title: &str,
        datetime: &str,
        description: &str,
        now: NaiveDateTime,
    ) -> Result<Reminder, ReminderError> {
        let due = parse_datetime(datetime)?;
        if due < now {
            return Err(ReminderError::PastTime);
        }

        self.last_id += 1;
        let reminder = Reminder {
            id: self.last_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            datetime: due,
            completed: false,
            created_at: now,
            completed_at: None,
        };
        self.reminders.insert(self.last_id, reminder.clone());

        Ok(reminder)
    }

    /// List reminders sorted by due time
    pub fn list(&self, include_completed: bool) -> Vec<Reminder> {
        sorted(
            self.reminders
                .values()
                .filter(|r| include_completed || !r.completed)
                .cloned()
                .collect(),
        )
    }

    /// Pending reminders due within the next `hours` hours
    pub fn upcoming(
        &self,
        hours: i64,
        now: NaiveDateTime,
    ) -> Result<Vec<UpcomingReminder>, ReminderError> {
        let until = TimeDelta::try_hours(hours)
            .and_then(|window| now.checked_add_signed(window))
            .ok_or(ReminderError::InvalidHours)?;

        let upcoming = self
            .pending()
            .filter(|r| now <= r.datetime && r.datetime <= until)
            .map(|r| UpcomingReminder {
                reminder: r.clone(),
                hours_until: hours_rounded(r.datetime - now),
            });

        Ok(sorted_by_due(upcoming.collect(), |u| u.reminder.datetime))
    }

    /// Pending reminders whose time has already passed
    pub fn overdue(&self, now: NaiveDateTime) -> Vec<OverdueReminder> {
        let overdue = self
            .pending()
            .filter(|r| r.datetime < now)
            .map(|r| OverdueReminder {
                reminder: r.clone(),
                hours_overdue: hours_rounded(now - r.datetime),
            });

        sorted_by_due(overdue.collect(), |o| o.reminder.datetime)
    }

    /// Mark a reminder as completed
    pub fn complete(&mut self, id: &str, now: NaiveDateTime) -> Result<Reminder, ReminderError> {
        let key = key_for(id)?;
        let reminder = self
            .reminders
            .get_mut(&key)
            .ok_or_else(|| not_found(id))?;

        reminder.completed = true;
        reminder.completed_at = Some(now);
        Ok(reminder.clone())
    }

    /// Remove a reminder, returning it
    pub fn delete(&mut self, id: &str) -> Result<Reminder, ReminderError> {
        let key = key_for(id)?;
        self.reminders.remove(&key).ok_or_else(|| not_found(id))
    }

    /// Case-insensitive substring search over title and description
    pub fn search(&self, query: &str) -> Vec<Reminder> {
        let needle = query.to_lowercase();
        sorted(
            self.reminders
                .values()
                .filter(|r| {
                    r.title.to_lowercase().contains(&needle)
                        || r.description.to_lowercase().contains(&needle)
                })
                .cloned()
                .collect(),
        )
    }

    /// Counters over the whole book
    pub fn stats(&self, now: NaiveDateTime) -> ReminderStats {
        let day_ahead = now + TimeDelta::hours(24);
        let completed = self.reminders.values().filter(|r| r.completed).count();

        let mut stats = ReminderStats {
            total_reminders: self.reminders.len(),
            completed,
            pending: self.reminders.len() - completed,
            ..Default::default()
        };

        for reminder in self.pending() {
            if reminder.datetime < now {
                stats.overdue += 1;
            } else if reminder.datetime <= day_ahead {
                stats.upcoming_24h += 1;
            }
        }

        stats
    }

    fn pending(&self) -> impl Iterator<Item = &Reminder> {
        self.reminders.values().filter(|r| !r.completed)
    }
}

/// Map an external id onto a storage key; only canonical decimal ids match
fn key_for(id: &str) -> Result<u64, ReminderError> {
    id.parse::<u64>()
        .ok()
        .filter(|key| key.to_string() == id)
        .ok_or_else(|| not_found(id))
}

fn not_found(id: &str) -> ReminderError {
    ReminderError::NotFound { id: id.to_string() }
}

fn sorted(reminders: Vec<Reminder>) -> Vec<Reminder> {
    sorted_by_due(reminders, |r| r.datetime)
}

// Stable sort: equal due times keep creation order.
fn sorted_by_due<T, F>(mut items: Vec<T>, due: F) -> Vec<T>
where
    F: Fn(&T) -> NaiveDateTime,
{
    items.sort_by_key(|item| due(item));
    items
}
