//! Driver preference model.
//!
//! Each driver submits one preference map per week. Slots without an
//! explicit entry are `Neutral`; the default is spelled out by
//! [`WeeklySubmission::preference`] rather than left to a missing key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{DriverId, TimeSlot, WeekId};

/// A driver's stated willingness to cover a slot.
///
/// Variants are declared in tier order: the engine tries `Preferable`
/// candidates first, then `LessPreferable`, then `Neutral`. `Unavailable`
/// is a hard exclusion, never a tier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceLevel {
    /// Driver would like this slot.
    Preferable,
    /// Driver can take this slot but would rather not.
    LessPreferable,
    /// No stated preference.
    #[default]
    Neutral,
    /// Driver cannot take this slot.
    Unavailable,
}

impl PreferenceLevel {
    /// Tiers the engine walks, highest priority first.
    pub const TIERS: [PreferenceLevel; 3] = [
        PreferenceLevel::Preferable,
        PreferenceLevel::LessPreferable,
        PreferenceLevel::Neutral,
    ];

    /// Whether the driver may be assigned at this level.
    pub fn is_available(&self) -> bool {
        !matches!(self, PreferenceLevel::Unavailable)
    }
}

impl fmt::Display for PreferenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PreferenceLevel::Preferable => "preferable",
            PreferenceLevel::LessPreferable => "less_preferable",
            PreferenceLevel::Neutral => "neutral",
            PreferenceLevel::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// One driver's preference submission for one week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySubmission {
    /// Submitting driver.
    pub driver_id: DriverId,
    /// Week the preferences apply to.
    pub week: WeekId,
    /// When the driver submitted.
    pub submitted_at: DateTime<Utc>,
    /// Explicit preferences. Absent slots are `Neutral`.
    pub preferences: BTreeMap<TimeSlot, PreferenceLevel>,
}

impl WeeklySubmission {
    /// Creates an empty (all-neutral) submission.
    pub fn new(
        driver_id: impl Into<DriverId>,
        week: WeekId,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            driver_id: driver_id.into(),
            week,
            submitted_at,
            preferences: BTreeMap::new(),
        }
    }

    /// Sets the preference for a slot.
    ///
    /// Setting `Neutral` removes the explicit entry.
    pub fn with_preference(mut self, slot: TimeSlot, level: PreferenceLevel) -> Self {
        self.set_preference(slot, level);
        self
    }

    /// Sets the preference for a slot in place.
    pub fn set_preference(&mut self, slot: TimeSlot, level: PreferenceLevel) {
        if level == PreferenceLevel::Neutral {
            self.preferences.remove(&slot);
        } else {
            self.preferences.insert(slot, level);
        }
    }

    /// Preference for a slot, `Neutral` when not stated.
    pub fn preference(&self, slot: &TimeSlot) -> PreferenceLevel {
        self.preferences.get(slot).copied().unwrap_or_default()
    }

    /// Number of explicit entries at the given level.
    ///
    /// Always 0 for `Neutral`, which is never stored explicitly.
    pub fn count(&self, level: PreferenceLevel) -> usize {
        self.preferences.values().filter(|&&l| l == level).count()
    }

    /// Copies these preferences onto another week.
    pub fn carried_to(&self, week: WeekId) -> Self {
        Self {
            week,
            ..self.clone()
        }
    }
}

/// A submission that passed [`PreferenceValidator`](crate::validation::PreferenceValidator).
///
/// Only the validator builds these, so an `AcceptedSubmission` always
/// satisfies the quota it was checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedSubmission {
    submission: WeeklySubmission,
}

impl AcceptedSubmission {
    pub(crate) fn new(submission: WeeklySubmission) -> Self {
        Self { submission }
    }

    /// Submitting driver.
    pub fn driver_id(&self) -> &DriverId {
        &self.submission.driver_id
    }

    /// Week the preferences apply to.
    pub fn week(&self) -> WeekId {
        self.submission.week
    }

    /// Preference for a slot, `Neutral` when not stated.
    pub fn preference(&self, slot: &TimeSlot) -> PreferenceLevel {
        self.submission.preference(slot)
    }

    /// The underlying submission.
    pub fn submission(&self) -> &WeeklySubmission {
        &self.submission
    }

    /// Re-keys an accepted submission onto a later week.
    ///
    /// Used when a prior week's preferences stand in for a missing one.
    pub(crate) fn carried_to(&self, week: WeekId) -> Self {
        Self::new(self.submission.carried_to(week))
    }
}
