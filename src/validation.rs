//! Preference submission validation.
//!
//! Checks a driver's weekly submission before it is accepted. Detects:
//! - Submissions arriving after the weekly cutoff
//! - Entries for slots that are not in the catalog
//! - Tier quota overruns (too many preferable, less-preferable or
//!   unavailable slots)
//!
//! Validation is pure: nothing is stored, and the current time is passed in
//! by the caller.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::catalog::SlotCatalog;
use crate::models::{AcceptedSubmission, PreferenceLevel, TimeSlot, WeekId, WeeklySubmission};

/// Validation result.
pub type ValidationResult = Result<AcceptedSubmission, ValidationError>;

/// Why a submission was rejected.
///
/// Every variant is terminal for the attempt; the driver must correct and
/// resubmit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Too many slots marked at a capped level.
    #[error("{count} slots marked {level}, at most {limit} allowed")]
    QuotaExceeded {
        level: PreferenceLevel,
        count: usize,
        limit: usize,
    },
    /// Submitted after the week's cutoff.
    #[error("submission for {week} at {submitted} missed the cutoff at {cutoff}")]
    DeadlineMissed {
        week: WeekId,
        cutoff: DateTime<Utc>,
        submitted: DateTime<Utc>,
    },
    /// Preference given for a slot the catalog does not define.
    #[error("slot '{slot}' is not in the catalog")]
    UnknownSlot { slot: TimeSlot },
}

/// Per-driver, per-week caps on explicit preference levels.
///
/// `Neutral` is uncapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceQuota {
    pub max_preferable: usize,
    pub max_less_preferable: usize,
    pub max_unavailable: usize,
}

impl Default for PreferenceQuota {
    fn default() -> Self {
        Self {
            max_preferable: 3,
            max_less_preferable: 2,
            max_unavailable: 2,
        }
    }
}

impl PreferenceQuota {
    /// Cap for a level, `None` if uncapped.
    pub fn limit(&self, level: PreferenceLevel) -> Option<usize> {
        match level {
            PreferenceLevel::Preferable => Some(self.max_preferable),
            PreferenceLevel::LessPreferable => Some(self.max_less_preferable),
            PreferenceLevel::Unavailable => Some(self.max_unavailable),
            PreferenceLevel::Neutral => None,
        }
    }
}

/// When submissions for a week close.
///
/// The cutoff for week `W` falls on `weekday` at `time` (community local
/// time, given as a fixed UTC offset) in the week `weeks_before` weeks
/// ahead of `W`. With the defaults, preferences for next week close this
/// Wednesday at 17:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineRule {
    pub weekday: Weekday,
    pub time: NaiveTime,
    /// Community offset from UTC in minutes (e.g. -300 for UTC-5).
    pub utc_offset_minutes: i32,
    pub weeks_before: u32,
}

impl Default for DeadlineRule {
    fn default() -> Self {
        Self {
            weekday: Weekday::Wed,
            time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            utc_offset_minutes: 0,
            weeks_before: 1,
        }
    }
}

impl DeadlineRule {
    /// The cutoff instant for submissions to `week`.
    pub fn cutoff_for(&self, week: WeekId) -> DateTime<Utc> {
        let mut target = week;
        for _ in 0..self.weeks_before {
            target = target.previous();
        }
        let local = target.day(self.weekday).and_time(self.time);
        let utc = local - Duration::minutes(i64::from(self.utc_offset_minutes));
        Utc.from_utc_datetime(&utc)
    }

    /// Whether `now` is after the cutoff for `week`.
    ///
    /// A submission landing exactly on the cutoff is still on time.
    pub fn is_past(&self, week: WeekId, now: DateTime<Utc>) -> bool {
        now > self.cutoff_for(week)
    }
}

/// Validates weekly submissions against quota and deadline rules.
#[derive(Debug, Clone, Default)]
pub struct PreferenceValidator {
    quota: PreferenceQuota,
    deadline: DeadlineRule,
    catalog: Option<SlotCatalog>,
}

impl PreferenceValidator {
    /// Creates a validator with default quota and deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tier quota.
    pub fn with_quota(mut self, quota: PreferenceQuota) -> Self {
        self.quota = quota;
        self
    }

    /// Sets the cutoff rule.
    pub fn with_deadline(mut self, deadline: DeadlineRule) -> Self {
        self.deadline = deadline;
        self
    }

    /// Restricts entries to slots of the given catalog.
    pub fn with_catalog(mut self, catalog: SlotCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Quota in force.
    pub fn quota(&self) -> &PreferenceQuota {
        &self.quota
    }

    /// Cutoff rule in force.
    pub fn deadline(&self) -> &DeadlineRule {
        &self.deadline
    }

    /// Accepts the submission or returns the first problem found.
    ///
    /// Checks run in order: deadline, unknown slots, quotas.
    pub fn validate(&self, submission: WeeklySubmission, now: DateTime<Utc>) -> ValidationResult {
        match self.violations(&submission, now).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(AcceptedSubmission::new(submission)),
        }
    }

    /// Lists every problem with a submission.
    pub fn violations(
        &self,
        submission: &WeeklySubmission,
        now: DateTime<Utc>,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.deadline.is_past(submission.week, now) {
            errors.push(ValidationError::DeadlineMissed {
                week: submission.week,
                cutoff: self.deadline.cutoff_for(submission.week),
                submitted: now,
            });
        }

        if let Some(catalog) = &self.catalog {
            for slot in submission.preferences.keys() {
                if !catalog.contains(slot) {
                    errors.push(ValidationError::UnknownSlot { slot: slot.clone() });
                }
            }
        }

        for level in [
            PreferenceLevel::Preferable,
            PreferenceLevel::LessPreferable,
            PreferenceLevel::Unavailable,
        ] {
            let count = submission.count(level);
            if let Some(limit) = self.quota.limit(level) {
                if count > limit {
                    errors.push(ValidationError::QuotaExceeded {
                        level,
                        count,
                        limit,
                    });
                }
            }
        }

        errors
    }
}
