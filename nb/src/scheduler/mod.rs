//! Reminder scheduler
//!
//! Polls the task store on a fixed interval and publishes `reminder.due`
//! and `reminder.nudge` events for the chat service to deliver. See
//! [`ReminderScheduler`] for the lifecycle contract.

mod config;
mod core;

pub use config::SchedulerConfig;
pub use core::{CycleStats, ReminderScheduler, RunState, SchedulerError};
