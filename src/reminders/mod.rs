//! Reminder domain
//!
//! In-memory reminder book and the helpers the reminder tools share.

pub mod book;
pub mod types;
pub mod utils;

pub use book::ReminderBook;
pub use types::{OverdueReminder, Reminder, ReminderStats, UpcomingReminder};
