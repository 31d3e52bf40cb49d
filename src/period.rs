// Period resolution - (month, year) pairs with an injected clock

use crate::validation::{require_month, ValidationError};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Source of "today" for default-period resolution
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    fn now_unix(&self) -> i64;
}

/// Wall clock (UTC)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock pinned to a fixed date (midnight UTC), for tests and replays
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub date: NaiveDate,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        FixedClock { date }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
    }

    fn now_unix(&self) -> i64 {
        self.date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default()
    }
}

/// A zero month or year in a query means "not given"
pub fn specified<T: Default + PartialEq>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v != T::default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub month: u32,
    pub year: i32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Result<Self, ValidationError> {
        Ok(Period {
            month: require_month("Period", month)?,
            year,
        })
    }

    /// Fill in whichever of month/year is missing from the clock.
    pub fn resolve(
        month: Option<u32>,
        year: Option<i32>,
        clock: &dyn Clock,
    ) -> Result<Self, ValidationError> {
        let today = clock.today();
        Period::new(
            specified(month).unwrap_or_else(|| today.month()),
            specified(year).unwrap_or_else(|| today.year()),
        )
    }

    /// Prefix matched against stored YYYY-MM-DD dates
    pub fn date_prefix(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}
