//! Study-day clock.
//!
//! "Today" is the local calendar date shifted by the daily reset hour, so a
//! late-night session still counts towards the previous day.

use std::sync::Mutex;

use chrono::{Duration, Local, NaiveDate, Timelike};

/// Source of the current study day.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall clock with a configurable day boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    pub daily_reset_hour: u32,
}

impl SystemClock {
    pub fn new(daily_reset_hour: u32) -> Self {
        Self { daily_reset_hour }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        get_adjusted_today(self.daily_reset_hour)
    }
}

/// Clock pinned to a date that tests can move.
#[derive(Debug)]
pub struct FixedClock {
    date: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        if let Ok(mut guard) = self.date.lock() {
            *guard = date;
        }
    }

    pub fn advance_days(&self, days: i64) {
        if let Ok(mut guard) = self.date.lock() {
            *guard += Duration::days(days);
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        match self.date.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Get adjusted "today" based on daily_reset_hour.
///
/// If the current hour is before the reset hour, "today" is actually
/// "yesterday" from a study perspective.
pub fn get_adjusted_today(daily_reset_hour: u32) -> NaiveDate {
    let now = Local::now();
    if now.hour() < daily_reset_hour {
        (now - Duration::days(1)).date_naive()
    } else {
        now.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midnight_reset() {
        let today = Local::now().date_naive();
        assert_eq!(SystemClock::new(0).today(), today);
    }

    #[test]
    fn test_fixed_clock_moves() {
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        clock.advance_days(1);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        clock.set(NaiveDate::from_ymd_opt(2023, 12, 25).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2023, 12, 25).unwrap());
    }
}
