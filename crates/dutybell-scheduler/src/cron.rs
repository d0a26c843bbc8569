//! Lightweight cron expression parser for the in-process reminder schedule.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Minute and hour take *, */N, N and comma lists. DOM, MON and DOW must be `*`.
//! Example: "0 9 * * *" = every day at 9:00

use chrono::{DateTime, Duration, TimeZone, Timelike};
use dutybell_core::error::{DutyBellError, Result};

/// A parsed daily schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(DutyBellError::Config(format!(
                "Invalid cron expression: '{expression}' (need 5 fields: MIN HOUR DOM MON DOW)"
            )));
        }
        if parts[2..].iter().any(|f| *f != "*") {
            return Err(DutyBellError::Config(format!(
                "Invalid cron expression: '{expression}' (day, month and weekday must be '*')"
            )));
        }

        let minutes = parse_field(parts[0], 0, 59).ok_or_else(|| {
            DutyBellError::Config(format!("Invalid minute field '{}'", parts[0]))
        })?;
        let hours = parse_field(parts[1], 0, 23).ok_or_else(|| {
            DutyBellError::Config(format!("Invalid hour field '{}'", parts[1]))
        })?;

        Ok(Self {
            expression: expression.trim().to_string(),
            minutes,
            hours,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First matching minute strictly after `after`, searched up to 48 hours ahead.
    pub fn next_after<Tz: TimeZone>(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut candidate = after + Duration::minutes(1);
        candidate = candidate.with_second(0)?.with_nanosecond(0)?;

        for _ in 0..(48 * 60) {
            if self.minutes.contains(&candidate.minute())
                && self.hours.contains(&candidate.hour())
            {
                return Some(candidate);
            }
            candidate = candidate + Duration::minutes(1);
        }
        None
    }
}

/// Parse a cron field into a list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    // */N — every N
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    // Comma-separated: "0,15,30,45"
    let values: Vec<u32> = field
        .split(',')
        .map(|s| s.trim().parse().ok())
        .collect::<Option<_>>()?;
    if values.iter().any(|v| *v < min || *v > max) {
        return None;
    }
    Some(values)
}
