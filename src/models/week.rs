//! ISO week identifier.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An ISO-8601 week (`2026-W42`).
///
/// Schedules, submissions and fairness deltas are all keyed by week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekId {
    year: i32,
    week: u32,
}

/// Error building or parsing a week identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ISO week '{0}'")]
pub struct WeekParseError(pub String);

impl WeekId {
    /// Creates a week identifier, checking that the ISO week exists.
    pub fn new(year: i32, week: u32) -> Result<Self, WeekParseError> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
            .map(|_| Self { year, week })
            .ok_or_else(|| WeekParseError(format!("{year}-W{week:02}")))
    }

    /// The ISO week containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// ISO week-numbering year.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// ISO week number (1..=53).
    pub fn week(&self) -> u32 {
        self.week
    }

    /// Monday of this week.
    pub fn monday(&self) -> NaiveDate {
        // Constructor guarantees the week exists.
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon).unwrap_or(NaiveDate::MIN)
    }

    /// A given weekday within this week.
    pub fn day(&self, weekday: Weekday) -> NaiveDate {
        self.monday() + Duration::days(i64::from(weekday.num_days_from_monday()))
    }

    /// The week before this one.
    pub fn previous(&self) -> Self {
        Self::containing(self.monday() - Duration::days(7))
    }

    /// The week after this one.
    pub fn next(&self) -> Self {
        Self::containing(self.monday() + Duration::days(7))
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekId {
    type Err = WeekParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || WeekParseError(s.to_string());
        let (year, week) = s.split_once("-W").ok_or_else(err)?;
        let year = year.parse::<i32>().map_err(|_| err())?;
        let week = week.parse::<u32>().map_err(|_| err())?;
        Self::new(year, week).map_err(|_| err())
    }
}

impl TryFrom<String> for WeekId {
    type Error = WeekParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WeekId> for String {
    fn from(week: WeekId) -> Self {
        week.to_string()
    }
}
