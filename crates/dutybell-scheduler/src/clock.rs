//! Clock abstraction so the run's notion of "today" can be pinned in tests.

use chrono::{DateTime, Local, NaiveDate};

/// Source of the current calendar date and local time.
pub trait Clock: Send + Sync {
    /// Today's calendar date in the deployment's local time zone.
    fn today(&self) -> NaiveDate;

    /// Current local time, used by the schedule loop.
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Wall clock in the process's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock frozen on one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }
}
