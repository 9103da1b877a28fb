//! Calendar date source for rotation decisions
//!
//! The sink only ever asks "what day is it?" and compares the answer field by field
//! against the day its open file was created for.

use std::fmt;
use std::sync::Mutex;

use chrono::{Datelike, Days, Local, NaiveDate};

/// Source of the current calendar date
pub trait Clock: Send + Sync + fmt::Debug {
    /// Today's date, read fresh on every call
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock whose date only changes when told to
///
/// Useful for exercising rollover without waiting for midnight.
#[derive(Debug)]
pub struct ManualClock {
    date: Mutex<NaiveDate>,
}

impl ManualClock {
    /// Create a clock fixed at `date`
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    /// Move the clock to `date`
    pub fn set(&self, date: NaiveDate) {
        if let Ok(mut current) = self.date.lock() {
            *current = date;
        }
    }

    /// Move the clock forward by `days`
    pub fn advance_days(&self, days: u64) {
        if let Ok(mut current) = self.date.lock() {
            if let Some(next) = current.checked_add_days(Days::new(days)) {
                *current = next;
            }
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        match self.date.lock() {
            Ok(date) => *date,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// True when both dates name the same calendar day
///
/// Compares year, month and day independently rather than subtracting instants.
pub fn same_day(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month() && a.day() == b.day()
}
