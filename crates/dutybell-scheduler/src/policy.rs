//! Reminder policy — decides whether an obligation gets a reminder today.
//!
//! Pure: no I/O, no clock access, no mutation. Callers pass `today` in and
//! receive a [`ReminderDecision`] back. Deletion and lifecycle filtering
//! happen at the storage boundary, so this module never looks at status.

use chrono::NaiveDate;
use dutybell_core::types::Obligation;
use serde::{Deserialize, Serialize};

/// Length of the rolling pre-due window covered by the `daily` rule.
pub const FINAL_WEEK_DAYS: i64 = 7;

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    AlreadyNotifiedToday,
    DueToday,
    Overdue,
    BeforeDays,
    FinalWeek,
    NoRuleMatched,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReminderDecision {
    pub notify: bool,
    /// Positive: due in the future. Zero: due today. Negative: overdue.
    pub days_left: i64,
    pub reason: DecisionReason,
}

impl ReminderDecision {
    fn fire(days_left: i64, reason: DecisionReason) -> Self {
        Self { notify: true, days_left, reason }
    }

    fn hold(days_left: i64, reason: DecisionReason) -> Self {
        Self { notify: false, days_left, reason }
    }
}

/// Whole calendar days from `today` until `due_date`.
pub fn days_left(due_date: NaiveDate, today: NaiveDate) -> i64 {
    (due_date - today).num_days()
}

/// At most one reminder per obligation per calendar day.
pub fn already_notified(obligation: &Obligation, today: NaiveDate) -> bool {
    obligation.last_notified_at == Some(today)
}

/// Evaluate an obligation's reminder rules for `today`.
///
/// The dedup guard runs first. After that the rules are tried in fixed
/// order and the first match wins: due date, overdue, exact `before_days`
/// offset, then the final-week window.
pub fn decide(today: NaiveDate, obligation: &Obligation) -> ReminderDecision {
    let left = days_left(obligation.due_date, today);

    if already_notified(obligation, today) {
        return ReminderDecision::hold(left, DecisionReason::AlreadyNotifiedToday);
    }

    let rules = &obligation.reminder_rules;

    if rules.on_due_date && left == 0 {
        return ReminderDecision::fire(left, DecisionReason::DueToday);
    }
    if rules.overdue && left < 0 {
        return ReminderDecision::fire(left, DecisionReason::Overdue);
    }
    if u32::try_from(left).is_ok_and(|offset| rules.before_days.contains(&offset)) {
        return ReminderDecision::fire(left, DecisionReason::BeforeDays);
    }
    if rules.daily && left > 0 && left <= FINAL_WEEK_DAYS {
        return ReminderDecision::fire(left, DecisionReason::FinalWeek);
    }

    ReminderDecision::hold(left, DecisionReason::NoRuleMatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dutybell_core::types::{ReminderRules, TaskType};
    use rstest::rstest;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn due_in(days: i64, rules: ReminderRules) -> Obligation {
        let due = today() + Duration::days(days);
        Obligation::new(TaskType::Amc, "Generator AMC", today() - Duration::days(60), due)
            .with_rules(rules)
    }

    fn rules(daily: bool, before_days: &[u32], on_due_date: bool, overdue: bool) -> ReminderRules {
        ReminderRules {
            daily,
            before_days: before_days.to_vec(),
            on_due_date,
            overdue,
            ..ReminderRules::none()
        }
    }

    #[test]
    fn days_left_sign_convention() {
        let d = today();
        assert_eq!(days_left(d + Duration::days(3), d), 3);
        assert_eq!(days_left(d, d), 0);
        assert_eq!(days_left(d - Duration::days(2), d), -2);
    }

    #[rstest]
    #[case::due_today_with_everything(0, rules(true, &[0, 1], true, true), true, DecisionReason::DueToday)]
    #[case::due_today_rule_off(0, rules(false, &[], false, true), false, DecisionReason::NoRuleMatched)]
    #[case::due_today_zero_offset(0, rules(false, &[0], false, false), true, DecisionReason::BeforeDays)]
    #[case::overdue(-1, rules(false, &[], false, true), true, DecisionReason::Overdue)]
    #[case::long_overdue(-45, rules(false, &[], false, true), true, DecisionReason::Overdue)]
    #[case::overdue_rule_off(-1, rules(true, &[1], true, false), false, DecisionReason::NoRuleMatched)]
    #[case::exact_offset(7, rules(false, &[7], false, false), true, DecisionReason::BeforeDays)]
    #[case::offset_not_listed(14, rules(false, &[15, 7, 1], false, false), false, DecisionReason::NoRuleMatched)]
    #[case::offset_beats_window(3, rules(true, &[3], false, false), true, DecisionReason::BeforeDays)]
    #[case::window_upper_edge(7, rules(true, &[], false, false), true, DecisionReason::FinalWeek)]
    #[case::window_lower_edge(1, rules(true, &[], false, false), true, DecisionReason::FinalWeek)]
    #[case::outside_window(8, rules(true, &[], false, false), false, DecisionReason::NoRuleMatched)]
    #[case::window_excludes_due_day(0, rules(true, &[], false, false), false, DecisionReason::NoRuleMatched)]
    #[case::window_excludes_overdue(-2, rules(true, &[], false, false), false, DecisionReason::NoRuleMatched)]
    #[case::no_rules(5, ReminderRules::none(), false, DecisionReason::NoRuleMatched)]
    fn rule_precedence(
        #[case] offset: i64,
        #[case] rules: ReminderRules,
        #[case] notify: bool,
        #[case] reason: DecisionReason,
    ) {
        let decision = decide(today(), &due_in(offset, rules));
        assert_eq!(decision.notify, notify);
        assert_eq!(decision.reason, reason);
        assert_eq!(decision.days_left, offset);
    }

    #[rstest]
    #[case(0)]
    #[case(-1)]
    #[case(7)]
    #[case(30)]
    fn notified_today_never_fires(#[case] offset: i64) {
        let mut ob = due_in(offset, ReminderRules::default());
        ob.reminder_rules.before_days.push(offset.unsigned_abs() as u32);
        ob.last_notified_at = Some(today());

        let decision = decide(today(), &ob);
        assert!(!decision.notify);
        assert_eq!(decision.reason, DecisionReason::AlreadyNotifiedToday);
    }

    #[test]
    fn notified_yesterday_does_not_block() {
        let mut ob = due_in(-3, rules(false, &[], false, true));
        ob.last_notified_at = Some(today() - Duration::days(1));
        assert!(decide(today(), &ob).notify);
    }

    #[test]
    fn overdue_fires_on_each_new_day() {
        let mut ob = due_in(-1, rules(false, &[], false, true));
        for day in 0..5 {
            let d = today() + Duration::days(day);
            let decision = decide(d, &ob);
            assert!(decision.notify, "day {day}");
            ob.last_notified_at = Some(d);
            assert!(!decide(d, &ob).notify, "day {day} repeat");
        }
    }

    #[test]
    fn duplicate_offsets_are_inert() {
        let ob = due_in(7, rules(false, &[7, 7, 7], false, false));
        let decision = decide(today(), &ob);
        assert!(decision.notify);
        assert_eq!(decision.reason, DecisionReason::BeforeDays);
    }

    #[test]
    fn decision_is_deterministic() {
        let ob = due_in(2, ReminderRules::default());
        let snapshot = ob.clone();
        let first = decide(today(), &ob);
        for _ in 0..10 {
            assert_eq!(decide(today(), &ob), first);
        }
        assert_eq!(ob, snapshot);
    }

    #[test]
    fn seven_days_out_with_matching_offset() {
        let ob = due_in(7, rules(false, &[7], false, false));
        let decision = decide(today(), &ob);
        assert!(decision.notify);
        assert_eq!(decision.days_left, 7);
    }

    #[test]
    fn dedup_guard_beats_overdue() {
        let mut ob = due_in(-1, rules(false, &[], false, true));
        ob.last_notified_at = Some(today());
        assert!(!decide(today(), &ob).notify);
    }
}
