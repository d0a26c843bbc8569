//! # DutyBell Core
//!
//! Shared building blocks for the reminder dispatcher:
//! - `types`: obligations, reminder rules, reminder log rows
//! - `config`: TOML configuration with environment overrides
//! - `error`: the crate-wide error type
//! - `traits`: the storage and channel collaborators the engine talks to

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::DutyBellConfig;
pub use error::{DutyBellError, Result};
pub use traits::{DeliveryReport, Notifier, ObligationStore, ProbeStatus};
pub use types::{
    DeliveryStatus, NewReminderLog, Obligation, ReminderLog, ReminderRules, TaskStatus, TaskType,
    TriggerKind,
};
