//! Reminder run orchestrator.
//!
//! One run: fetch the active obligations, evaluate each against a single
//! `today`, deliver the ones that are due, record every attempt in the
//! reminder ledger, advance the dedup marker on success, and aggregate
//! the counts. Obligations are processed one at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dutybell_core::config::{MessageMode, ReminderConfig};
use dutybell_core::error::Result;
use dutybell_core::traits::{DeliveryReport, Notifier, ObligationStore};
use dutybell_core::types::{DeliveryStatus, NewReminderLog, Obligation, TriggerKind};
use serde::Serialize;

use crate::clock::Clock;
use crate::cron::CronSchedule;
use crate::format::{format_digest, format_reminder};
use crate::policy::{self, DecisionReason};

const BUDGET_EXHAUSTED: &str = "Run budget exhausted before delivery completed";

/// Overall shape of a finished run.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No candidate was due a reminder.
    NothingToDo,
    /// Every attempted delivery succeeded.
    Delivered,
    /// Some deliveries succeeded and some failed.
    Partial,
    /// Every attempted delivery failed.
    Failed,
}

/// Aggregate result of one scheduled run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunResult {
    pub today: NaiveDate,
    pub mode: MessageMode,
    pub status: RunStatus,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    /// No rule matched, already notified today, or cut off by the run budget.
    pub skipped: usize,
    /// The run budget ran out before every candidate was processed.
    pub truncated: bool,
    /// Ledger or marker writes that failed after a delivery attempt.
    pub bookkeeping_errors: Vec<String>,
}

impl RunResult {
    fn new(today: NaiveDate, mode: MessageMode, total: usize) -> Self {
        Self {
            today,
            mode,
            status: RunStatus::NothingToDo,
            total,
            sent: 0,
            failed: 0,
            skipped: 0,
            truncated: false,
            bookkeeping_errors: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.status = match (self.sent, self.failed) {
            (0, 0) => RunStatus::NothingToDo,
            (_, 0) => RunStatus::Delivered,
            (0, _) => RunStatus::Failed,
            _ => RunStatus::Partial,
        };
        self
    }
}

/// Result of a manual single-obligation trigger.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ManualOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The obligation was already reminded today; nothing was sent.
    pub skipped: bool,
    pub days_left: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bookkeeping_errors: Vec<String>,
}

/// Drives reminder runs against a store and a channel.
pub struct ReminderEngine {
    store: Arc<dyn ObligationStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    mode: MessageMode,
    run_budget: Duration,
    dashboard_url: Option<String>,
}

impl ReminderEngine {
    pub fn new(
        store: Arc<dyn ObligationStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let defaults = ReminderConfig::default();
        Self {
            store,
            notifier,
            clock,
            mode: defaults.mode,
            run_budget: Duration::from_secs(defaults.run_budget_secs),
            dashboard_url: None,
        }
    }

    /// Build from the `[reminders]` config section.
    pub fn from_config(
        store: Arc<dyn ObligationStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: &ReminderConfig,
    ) -> Self {
        Self::new(store, notifier, clock)
            .with_mode(config.mode)
            .with_run_budget(Duration::from_secs(config.run_budget_secs))
            .with_dashboard_url(config.dashboard_url.clone())
    }

    pub fn with_mode(mut self, mode: MessageMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_run_budget(mut self, budget: Duration) -> Self {
        self.run_budget = budget;
        self
    }

    pub fn with_dashboard_url(mut self, url: Option<String>) -> Self {
        self.dashboard_url = url;
        self
    }

    /// Run a scheduled pass over every active obligation.
    ///
    /// Only a failure to fetch candidates is returned as an error; delivery
    /// and bookkeeping problems are reported inside the [`RunResult`].
    pub async fn run(&self) -> Result<RunResult> {
        let today = self.clock.today();
        let deadline = Instant::now() + self.run_budget;

        let candidates = self.store.fetch_active().await.map_err(|e| {
            tracing::error!("Error fetching tasks for reminders: {e}");
            e
        })?;

        tracing::info!(
            "Reminder run started: {} active task(s), mode={:?}, today={}",
            candidates.len(),
            self.mode,
            today
        );

        let mut result = RunResult::new(today, self.mode, candidates.len());
        match self.mode {
            MessageMode::PerTask => {
                self.deliver_each(&candidates, today, deadline, &mut result)
                    .await
            }
            MessageMode::Digest => {
                self.deliver_digest(&candidates, today, deadline, &mut result)
                    .await
            }
        }
        let result = result.finish();

        tracing::info!(
            "Reminder run finished: total={} sent={} failed={} skipped={}{}",
            result.total,
            result.sent,
            result.failed,
            result.skipped,
            if result.truncated { " (truncated)" } else { "" }
        );
        Ok(result)
    }

    async fn deliver_each(
        &self,
        candidates: &[Obligation],
        today: NaiveDate,
        deadline: Instant,
        result: &mut RunResult,
    ) {
        for (idx, obligation) in candidates.iter().enumerate() {
            let decision = policy::decide(today, obligation);
            if !decision.notify {
                tracing::debug!("Skipping '{}': {:?}", obligation.title, decision.reason);
                result.skipped += 1;
                continue;
            }

            if Instant::now() >= deadline {
                let remaining = candidates.len() - idx;
                tracing::warn!("Run budget exhausted; {remaining} task(s) left unprocessed");
                result.truncated = true;
                result.skipped += remaining;
                return;
            }

            let message = format_reminder(obligation, decision.days_left);
            let report = self.deliver(&message, deadline).await;
            if report.success {
                result.sent += 1;
                tracing::info!("Reminder sent for '{}' ({:?})", obligation.title, decision.reason);
            } else {
                result.failed += 1;
                tracing::warn!(
                    "Reminder failed for '{}': {}",
                    obligation.title,
                    report.error.as_deref().unwrap_or("unknown error")
                );
            }

            let entry =
                self.log_entry(Some(&obligation.id), &report, TriggerKind::Scheduled, None);
            let marked: &[Obligation] = if report.success {
                std::slice::from_ref(obligation)
            } else {
                &[]
            };
            result
                .bookkeeping_errors
                .extend(self.record(entry, marked, today).await);
        }
    }

    async fn deliver_digest(
        &self,
        candidates: &[Obligation],
        today: NaiveDate,
        deadline: Instant,
        result: &mut RunResult,
    ) {
        let due: Vec<Obligation> = candidates
            .iter()
            .filter(|o| policy::decide(today, o).notify)
            .cloned()
            .collect();
        result.skipped = candidates.len() - due.len();

        let Some(message) = format_digest(&due, today, self.dashboard_url.as_deref()) else {
            tracing::info!("No tasks due a reminder today; nothing to send");
            result.skipped = candidates.len();
            return;
        };

        if Instant::now() >= deadline {
            tracing::warn!("Run budget exhausted before digest delivery");
            result.truncated = true;
            result.skipped = candidates.len();
            return;
        }

        let report = self.deliver(&message, deadline).await;
        if report.success {
            result.sent = due.len();
            tracing::info!("Digest sent covering {} task(s)", due.len());
        } else {
            result.failed = due.len();
            tracing::warn!(
                "Digest failed: {}",
                report.error.as_deref().unwrap_or("unknown error")
            );
        }

        let summary = format!("Summary of {} tasks", due.len());
        let entry = self.log_entry(None, &report, TriggerKind::Scheduled, Some(summary));
        let marked: &[Obligation] = if report.success { &due } else { &[] };
        result
            .bookkeeping_errors
            .extend(self.record(entry, marked, today).await);
    }

    /// Send one reminder for a single obligation, outside the scheduled run.
    ///
    /// Shares the dedup marker with scheduled runs: an obligation already
    /// reminded today is not sent again. Reminder rules are not consulted.
    pub async fn remind_one(&self, id: &str) -> Result<ManualOutcome> {
        let today = self.clock.today();
        let obligation = self.store.get(id).await?;
        let days_left = policy::days_left(obligation.due_date, today);

        if policy::already_notified(&obligation, today) {
            tracing::info!(
                "Manual reminder for '{}' skipped: {:?}",
                obligation.title,
                DecisionReason::AlreadyNotifiedToday
            );
            return Ok(ManualOutcome {
                success: false,
                error: Some("Already notified today".into()),
                skipped: true,
                days_left,
                bookkeeping_errors: Vec::new(),
            });
        }

        let message = format_reminder(&obligation, days_left);
        let report = self.deliver(&message, Instant::now() + self.run_budget).await;
        tracing::info!(
            "Manual reminder for '{}': {}",
            obligation.title,
            if report.success { "sent" } else { "failed" }
        );

        let entry = self.log_entry(
            Some(&obligation.id),
            &report,
            TriggerKind::Manual,
            Some("Manual trigger".into()),
        );
        let marked: &[Obligation] = if report.success {
            std::slice::from_ref(&obligation)
        } else {
            &[]
        };
        let bookkeeping_errors = self.record(entry, marked, today).await;

        Ok(ManualOutcome {
            success: report.success,
            error: report.error,
            skipped: false,
            days_left,
            bookkeeping_errors,
        })
    }

    /// Hand a message to the channel, never waiting past `deadline`.
    async fn deliver(&self, message: &str, deadline: Instant) -> DeliveryReport {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, self.notifier.send(message)).await {
            Ok(report) => report,
            Err(_) => DeliveryReport::failed(BUDGET_EXHAUSTED),
        }
    }

    fn log_entry(
        &self,
        task_id: Option<&str>,
        report: &DeliveryReport,
        trigger: TriggerKind,
        success_detail: Option<String>,
    ) -> NewReminderLog {
        let (status, error_message) = if report.success {
            (DeliveryStatus::Sent, success_detail)
        } else {
            (DeliveryStatus::Failed, report.error.clone())
        };
        NewReminderLog {
            task_id: task_id.map(String::from),
            channel: self.notifier.name().to_string(),
            status,
            error_message,
            trigger,
        }
    }

    /// Append the ledger row, then advance the dedup marker on `marked`.
    /// Returns the bookkeeping faults; they never turn a sent message into a failure.
    async fn record(
        &self,
        entry: NewReminderLog,
        marked: &[Obligation],
        today: NaiveDate,
    ) -> Vec<String> {
        let mut faults = Vec::new();

        if let Err(e) = self.store.append_log(entry).await {
            tracing::warn!("Failed to write reminder log: {e}");
            faults.push(format!("reminder log: {e}"));
        }
        for obligation in marked {
            if let Err(e) = self.store.mark_notified(&obligation.id, today).await {
                tracing::warn!(
                    "Reminder delivered but last_notified_at not updated for {}: {e}",
                    obligation.id
                );
                faults.push(format!("last_notified_at for {}: {e}", obligation.id));
            }
        }
        faults
    }
}

/// Run the engine whenever the cron schedule comes due.
/// Checks every `check_interval_secs` against the engine's clock; runs never
/// overlap within this loop. Callers spawn it.
pub async fn run_schedule(
    engine: Arc<ReminderEngine>,
    schedule: CronSchedule,
    check_interval_secs: u64,
) {
    tracing::info!(
        "⏰ Reminder schedule started: '{}' (check every {}s)",
        schedule.expression(),
        check_interval_secs
    );

    let mut interval =
        tokio::time::interval(Duration::from_secs(check_interval_secs.max(1)));
    let mut next = schedule.next_after(engine.clock.now());

    loop {
        interval.tick().await;

        let now = engine.clock.now();
        let Some(due_at) = next else {
            tracing::warn!(
                "Schedule '{}' has no upcoming run; stopping",
                schedule.expression()
            );
            return;
        };
        if now < due_at {
            continue;
        }

        match engine.run().await {
            Ok(result) => tracing::info!(
                "📣 Scheduled reminder run: {:?} (sent={}, failed={})",
                result.status,
                result.sent,
                result.failed
            ),
            Err(e) => tracing::error!("Scheduled reminder run failed: {e}"),
        }
        next = schedule.next_after(engine.clock.now());
    }
}
