//! Collaborator traits: the storage and channel seams the reminder engine depends on.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{NewReminderLog, Obligation};

/// Storage collaborator for obligations and the reminder ledger.
///
/// Writes are independent: there is no transaction spanning a log insert
/// and a marker update.
#[async_trait]
pub trait ObligationStore: Send + Sync {
    /// Non-deleted obligations with status PENDING or IN_PROGRESS.
    async fn fetch_active(&self) -> Result<Vec<Obligation>>;

    /// A single non-deleted obligation, regardless of status.
    async fn get(&self, id: &str) -> Result<Obligation>;

    /// Overwrite the dedup marker. Idempotent for the same date.
    async fn mark_notified(&self, id: &str, date: NaiveDate) -> Result<()>;

    /// Append one row to the reminder ledger and return its id.
    async fn append_log(&self, entry: NewReminderLog) -> Result<i64>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<()>;
}

/// Result of handing one message to a channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn sent() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Channel reachability as reported to the health probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Connected,
    AuthFailed,
    ConfigMissing,
    Failed,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Connected => "connected",
            ProbeStatus::AuthFailed => "auth_failed",
            ProbeStatus::ConfigMissing => "config_missing",
            ProbeStatus::Failed => "failed",
        }
    }
}

/// Outbound messaging channel.
///
/// Implementations never retry and never panic on provider errors: every
/// problem is folded into a failed [`DeliveryReport`].
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel identifier written to the reminder ledger.
    fn name(&self) -> &str;

    /// Deliver one pre-rendered message.
    async fn send(&self, text: &str) -> DeliveryReport;

    /// Check credentials against the provider without sending anything.
    async fn probe(&self) -> ProbeStatus;
}
