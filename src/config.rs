//! Environment configuration.
//!
//! All variables use the `CARPOOL_` prefix and have defaults, so an empty
//! environment yields the standard policy: Mon-Fri morning and afternoon
//! slots on one route, submissions closing Wednesday 17:00 UTC the week
//! before, quotas of 3 preferable / 2 less-preferable / 2 unavailable.

use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use envconfig::Envconfig;

use crate::catalog::SlotCatalog;
use crate::lifecycle::LateSubmissionPolicy;
use crate::validation::{DeadlineRule, PreferenceQuota, PreferenceValidator};

/// Missing or malformed `CARPOOL_*` variable.
pub use envconfig::Error as ConfigError;

#[derive(Envconfig, Debug, Clone)]
pub struct Config {
    #[envconfig(from = "CARPOOL_CUTOFF_WEEKDAY", default = "Wed")]
    pub cutoff_weekday: Weekday,

    #[envconfig(from = "CARPOOL_CUTOFF_TIME", default = "17:00")]
    pub cutoff_time: EnvTime,

    #[envconfig(from = "CARPOOL_UTC_OFFSET_MINUTES", default = "0")]
    pub utc_offset_minutes: i32,

    #[envconfig(from = "CARPOOL_CUTOFF_WEEKS_BEFORE", default = "1")]
    pub cutoff_weeks_before: u32,

    #[envconfig(from = "CARPOOL_MAX_PREFERABLE", default = "3")]
    pub max_preferable: usize,

    #[envconfig(from = "CARPOOL_MAX_LESS_PREFERABLE", default = "2")]
    pub max_less_preferable: usize,

    #[envconfig(from = "CARPOOL_MAX_UNAVAILABLE", default = "2")]
    pub max_unavailable: usize,

    #[envconfig(from = "CARPOOL_LATE_SUBMISSION_POLICY", default = "neutral")]
    pub late_submission_policy: LateSubmissionPolicy,

    #[envconfig(from = "CARPOOL_ROUTES", default = "north")]
    pub routes: RouteList,
}

impl Config {
    /// Submission cutoff rule.
    pub fn deadline_rule(&self) -> DeadlineRule {
        DeadlineRule {
            weekday: self.cutoff_weekday,
            time: self.cutoff_time.0,
            utc_offset_minutes: self.utc_offset_minutes,
            weeks_before: self.cutoff_weeks_before,
        }
    }

    /// Tier quota.
    pub fn quota(&self) -> PreferenceQuota {
        PreferenceQuota {
            max_preferable: self.max_preferable,
            max_less_preferable: self.max_less_preferable,
            max_unavailable: self.max_unavailable,
        }
    }

    /// Standard weekday catalog over the configured routes.
    pub fn catalog(&self) -> SlotCatalog {
        SlotCatalog::standard(self.routes.0.as_slice())
    }

    /// Validator built from quota, cutoff and catalog.
    pub fn validator(&self) -> PreferenceValidator {
        PreferenceValidator::new()
            .with_quota(self.quota())
            .with_deadline(self.deadline_rule())
            .with_catalog(self.catalog())
    }
}

/// Time of day given as `HH:MM` or `HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvTime(pub NaiveTime);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvTimeError;

impl FromStr for EnvTime {
    type Err = ParseEnvTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .map(EnvTime)
            .map_err(|_| ParseEnvTimeError)
    }
}

/// Comma-separated, non-empty route labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteList(pub Vec<String>);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseRouteListError;

impl FromStr for RouteList {
    type Err = ParseRouteListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let routes: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect();
        if routes.is_empty() {
            Err(ParseRouteListError)
        } else {
            Ok(RouteList(routes))
        }
    }
}
