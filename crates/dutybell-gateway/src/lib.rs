//! # DutyBell Gateway
//! HTTP surface: cron trigger, manual reminders, reminder log, health probe.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
