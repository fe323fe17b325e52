//! Time slot model.
//!
//! A slot is one recurring unit of driving duty: a weekday, a period of the
//! day and a route. The same slot exists in every week, so a slot carries
//! no date.
//!
//! # Ordering
//! Slots order by day (Monday first), then period (morning before
//! afternoon), then route label. The assignment engine walks slots in this
//! order, which makes it part of the fairness outcome.
//!
//! # Text form
//! `"<Day>-<period>-<route>"`, e.g. `"Tue-morning-north"`. Serde uses the
//! same form, so slot-keyed maps serialize as JSON objects.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Part of the school day a slot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Drop-off run before school.
    Morning,
    /// Pickup run after school.
    Afternoon,
}

impl Period {
    fn as_str(&self) -> &'static str {
        match self {
            Period::Morning => "morning",
            Period::Afternoon => "afternoon",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = SlotParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "morning" | "am" => Ok(Period::Morning),
            "afternoon" | "pm" => Ok(Period::Afternoon),
            _ => Err(SlotParseError::Period(s.to_string())),
        }
    }
}

/// A recurring weekly driving slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot {
    /// Day of the week.
    pub day: Weekday,
    /// Morning or afternoon run.
    pub period: Period,
    /// Route label (e.g. "north", "elm-street").
    pub route: String,
}

/// Error parsing a slot from its text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotParseError {
    #[error("slot '{0}' is not of the form <day>-<period>-<route>")]
    Shape(String),
    #[error("unknown weekday '{0}'")]
    Day(String),
    #[error("unknown period '{0}'")]
    Period(String),
}

impl TimeSlot {
    /// Creates a slot.
    pub fn new(day: Weekday, period: Period, route: impl Into<String>) -> Self {
        Self {
            day,
            period,
            route: route.into(),
        }
    }

    /// Shorthand for a morning slot.
    pub fn morning(day: Weekday, route: impl Into<String>) -> Self {
        Self::new(day, Period::Morning, route)
    }

    /// Shorthand for an afternoon slot.
    pub fn afternoon(day: Weekday, route: impl Into<String>) -> Self {
        Self::new(day, Period::Afternoon, route)
    }

    fn sort_key(&self) -> (u32, Period, &str) {
        (self.day.num_days_from_monday(), self.period, &self.route)
    }
}

impl Ord for TimeSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for TimeSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.day, self.period, self.route)
    }
}

impl FromStr for TimeSlot {
    type Err = SlotParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        let (day, period, route) = match (parts.next(), parts.next(), parts.next()) {
            (Some(d), Some(p), Some(r)) if !r.is_empty() => (d, p, r),
            _ => return Err(SlotParseError::Shape(s.to_string())),
        };
        let day = day
            .parse::<Weekday>()
            .map_err(|_| SlotParseError::Day(day.to_string()))?;
        Ok(Self::new(day, period.parse()?, route))
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = SlotParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.to_string()
    }
}
