//! Domain types: obligations, their reminder policy, and the reminder ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a tracked obligation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Repair,
    Amc,
    Letter,
    Other,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Repair => "REPAIR",
            TaskType::Amc => "AMC",
            TaskType::Letter => "LETTER",
            TaskType::Other => "OTHER",
        }
    }

    /// Parse the stored form. Unknown values fall back to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "REPAIR" => TaskType::Repair,
            "AMC" => TaskType::Amc,
            "LETTER" => TaskType::Letter,
            _ => TaskType::Other,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an obligation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TaskStatus::Pending),
            "IN_PROGRESS" => Some(TaskStatus::InProgress),
            "COMPLETED" => Some(TaskStatus::Completed),
            "CANCELLED" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Open statuses are the only ones that ever receive reminders.
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-obligation reminder policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReminderRules {
    /// Rolling reminder during the final week before the due date.
    #[serde(default)]
    pub daily: bool,
    /// Exact day offsets before the due date.
    #[serde(default)]
    pub before_days: Vec<u32>,
    #[serde(default)]
    pub on_due_date: bool,
    /// Remind on every day past the due date.
    #[serde(default)]
    pub overdue: bool,
    /// Informational only; evaluation is date-granular.
    #[serde(default = "default_time_of_day")]
    pub time_of_day: String,
}

fn default_time_of_day() -> String {
    "09:00".into()
}

impl Default for ReminderRules {
    fn default() -> Self {
        Self {
            daily: true,
            before_days: vec![30, 21, 15, 7, 1],
            on_due_date: true,
            overdue: true,
            time_of_day: default_time_of_day(),
        }
    }
}

impl ReminderRules {
    /// Rules with every trigger switched off.
    pub fn none() -> Self {
        Self {
            daily: false,
            before_days: Vec::new(),
            on_due_date: false,
            overdue: false,
            time_of_day: default_time_of_day(),
        }
    }
}

/// A tracked obligation (repair, maintenance contract, correspondence deadline).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Obligation {
    pub id: String,
    pub task_type: TaskType,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub reminder_rules: ReminderRules,
    /// Dedup marker: the calendar date of the last successful reminder.
    pub last_notified_at: Option<NaiveDate>,
    pub reference_no: Option<String>,
    pub department: Option<String>,
    pub vendor: Option<String>,
    pub amount: Option<f64>,
    pub assigned_to: Option<String>,
    pub created_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Obligation {
    /// Create a pending obligation with default reminder rules.
    pub fn new(
        task_type: TaskType,
        title: &str,
        start_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_type,
            title: title.to_string(),
            description: None,
            status: TaskStatus::Pending,
            start_date,
            due_date,
            reminder_rules: ReminderRules::default(),
            last_notified_at: None,
            reference_no: None,
            department: None,
            vendor: None,
            amount: None,
            assigned_to: None,
            created_by: None,
            completed_at: None,
            completed_by: None,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style override of the reminder rules.
    pub fn with_rules(mut self, rules: ReminderRules) -> Self {
        self.reminder_rules = rules;
        self
    }

    /// Not soft-deleted and still open.
    pub fn is_reminder_candidate(&self) -> bool {
        self.deleted_at.is_none() && self.status.is_open()
    }

    /// Short human reference: the first dash-separated segment of the id.
    pub fn short_ref(&self) -> &str {
        self.id.split('-').next().unwrap_or(&self.id)
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "SENT" { DeliveryStatus::Sent } else { DeliveryStatus::Failed }
    }
}

/// What started the run that produced a log row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Scheduled => "SCHEDULED",
            TriggerKind::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "MANUAL" { TriggerKind::Manual } else { TriggerKind::Scheduled }
    }
}

/// A row to append to the reminder ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewReminderLog {
    /// `None` for a digest run covering many obligations.
    pub task_id: Option<String>,
    pub channel: String,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub trigger: TriggerKind,
}

/// A persisted reminder ledger row. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderLog {
    pub id: i64,
    pub task_id: Option<String>,
    pub channel: String,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub trigger: TriggerKind,
    pub sent_at: DateTime<Utc>,
}
