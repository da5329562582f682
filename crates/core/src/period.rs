use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("Expected 'START:END', got '{0}'")]
    Malformed(String),
    #[error("Years must be integers, got '{0}'")]
    NotAYear(String),
    #[error("Start year must be less than end year, got '{0}'")]
    NotIncreasing(String),
}

/// Half-open date interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} until {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Parses `"2020:2026"` into 2020-01-01 ..< 2026-01-01.
    pub fn parse_years(s: &str) -> Result<Self, RangeError> {
        let (start, end) = s
            .split_once(':')
            .ok_or_else(|| RangeError::Malformed(s.to_string()))?;
        let start: i32 = start
            .trim()
            .parse()
            .map_err(|_| RangeError::NotAYear(s.to_string()))?;
        let end: i32 = end
            .trim()
            .parse()
            .map_err(|_| RangeError::NotAYear(s.to_string()))?;
        if start >= end {
            return Err(RangeError::NotIncreasing(s.to_string()));
        }
        let jan_first = |year: i32| {
            NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| RangeError::NotAYear(s.to_string()))
        };
        Ok(DateRange::new(jan_first(start)?, jan_first(end)?))
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn contains_timestamp(self, ts: NaiveDateTime) -> bool {
        self.contains(ts.date())
    }
}
