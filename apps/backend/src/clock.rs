//! Wall clock and study-day calendar.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, NaiveDate, Timelike, Utc};

/// Source of the current instant and the learner's study day.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The learner's current study day.
    fn today(&self) -> NaiveDate;
}

/// Local system time with a configurable day rollover hour.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    /// Hour of day (0-23) at which a new study day begins.
    pub day_reset_hour: u32,
}

impl SystemClock {
    pub fn new(day_reset_hour: u32) -> Self {
        Self { day_reset_hour }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        let now = Local::now();
        if now.hour() < self.day_reset_hour {
            (now - Duration::days(1)).date_naive()
        } else {
            now.date_naive()
        }
    }
}

/// Settable clock for tests. The study day is the UTC date of `now`.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}
