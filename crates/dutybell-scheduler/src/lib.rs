//! # DutyBell Scheduler
//! Reminder policy, message formatting, persistence, and run orchestration.
//!
//! ## Features:
//! - **Policy**: pure per-day decision for each obligation
//! - **Format**: per-task reminder and consolidated digest (Telegram HTML)
//! - **Persistence**: SQLite-backed obligations and reminder ledger
//! - **Engine**: fetch → evaluate → deliver → record → aggregate
//! - **Cron**: optional in-process daily trigger

pub mod clock;
pub mod cron;
pub mod engine;
pub mod format;
pub mod persistence;
pub mod policy;

pub use clock::{Clock, FixedClock, SystemClock};
pub use cron::CronSchedule;
pub use engine::{ManualOutcome, ReminderEngine, RunResult, RunStatus, run_schedule};
pub use persistence::ReminderDb;
pub use policy::{DecisionReason, ReminderDecision, decide};
