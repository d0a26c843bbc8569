//! Message rendering for the Telegram HTML parse mode.
//!
//! Two modes: a per-obligation reminder and a consolidated digest. Both are
//! pure functions of their inputs. User-supplied text is HTML-escaped.

use chrono::NaiveDate;
use dutybell_core::types::{Obligation, TaskStatus};

/// Urgency tier derived from days left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    /// Three days or fewer, including due today and overdue.
    Critical,
    /// Within the final week.
    Elevated,
    Routine,
}

impl Urgency {
    pub fn from_days_left(days_left: i64) -> Self {
        if days_left <= 3 {
            Urgency::Critical
        } else if days_left <= 7 {
            Urgency::Elevated
        } else {
            Urgency::Routine
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Urgency::Critical => "🚨",
            Urgency::Elevated => "⚠️",
            Urgency::Routine => "🔔",
        }
    }
}

/// Human-readable relative time: `today`, `overdue by N days`, `in N days`.
pub fn time_phrase(days_left: i64) -> String {
    match days_left {
        0 => "today".into(),
        d if d < 0 => format!("overdue by {}", plural_days(d.unsigned_abs())),
        d => format!("in {}", plural_days(d.unsigned_abs())),
    }
}

fn plural_days(n: u64) -> String {
    if n == 1 { "1 day".into() } else { format!("{n} days") }
}

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "⏳",
        TaskStatus::InProgress => "🚧",
        TaskStatus::Completed => "✅",
        TaskStatus::Cancelled => "✖️",
    }
}

/// Calendar date as `d/m/yyyy`.
pub fn display_date(date: NaiveDate) -> String {
    date.format("%-d/%-m/%Y").to_string()
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render a single-obligation reminder.
pub fn format_reminder(obligation: &Obligation, days_left: i64) -> String {
    let urgent = Urgency::from_days_left(days_left).icon();

    let headline = match days_left {
        0 => "<b>Expiring TODAY!</b>".to_string(),
        d if d < 0 => format!("<b>OVERDUE by {}</b>", plural_days(d.unsigned_abs())),
        d => format!("Expiring in <b>{}</b>", plural_days(d.unsigned_abs())),
    };

    let department = obligation
        .department
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(escape_html)
        .unwrap_or_else(|| "N/A".into());

    format!(
        "{urgent} <b>OFFICIAL REMINDER</b> {urgent}\n\
         \n\
         <b>Task:</b> {task_type}\n\
         <b>Title:</b> {title}\n\
         <b>Department:</b> {department}\n\
         <b>Due Date:</b> {due}\n\
         <b>Status:</b> {status} {status_icon}\n\
         \n\
         {headline}\n\
         \n\
         <i>Please take necessary action. Refer to ID: {reference}</i>",
        task_type = obligation.task_type,
        title = escape_html(&obligation.title),
        due = display_date(obligation.due_date),
        status = obligation.status,
        status_icon = status_icon(obligation.status),
        reference = escape_html(obligation.short_ref()),
    )
}

/// Render one consolidated message for a batch of obligations.
///
/// Obligations are grouped into pending and in-progress sections, each
/// sorted by due date. Returns `None` when both groups are empty.
pub fn format_digest(
    obligations: &[Obligation],
    today: NaiveDate,
    dashboard_url: Option<&str>,
) -> Option<String> {
    let mut pending: Vec<&Obligation> = obligations
        .iter()
        .filter(|o| o.status == TaskStatus::Pending)
        .collect();
    let mut in_progress: Vec<&Obligation> = obligations
        .iter()
        .filter(|o| o.status == TaskStatus::InProgress)
        .collect();

    if pending.is_empty() && in_progress.is_empty() {
        return None;
    }

    pending.sort_by_key(|o| o.due_date);
    in_progress.sort_by_key(|o| o.due_date);

    let mut out = format!(
        "📋 <b>TASK REMINDER SUMMARY</b>\n<i>{}</i>\n",
        display_date(today)
    );

    for (label, icon, group) in [
        ("Pending", status_icon(TaskStatus::Pending), &pending),
        ("In Progress", status_icon(TaskStatus::InProgress), &in_progress),
    ] {
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{icon} <b>{label} ({})</b>\n", group.len()));
        for o in group.iter() {
            let left = crate::policy::days_left(o.due_date, today);
            out.push_str(&format!(
                "{} {} — due {} ({})\n",
                Urgency::from_days_left(left).icon(),
                escape_html(&o.title),
                display_date(o.due_date),
                time_phrase(left),
            ));
        }
    }

    if let Some(url) = dashboard_url.filter(|u| !u.trim().is_empty()) {
        out.push_str(&format!(
            "\n🔗 <a href=\"{}\">Open task manager</a>",
            escape_html(url).replace('"', "&quot;")
        ));
    }

    Some(out.trim_end().to_string())
}
