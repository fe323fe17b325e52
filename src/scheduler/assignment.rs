//! Greedy tiered driver assignment.
//!
//! # Algorithm
//!
//! For each slot, in catalog order:
//!
//! 1. Build the eligibility pool: active parent drivers who did not mark
//!    the slot unavailable. An empty pool leaves the slot unassigned and
//!    records it as infeasible; generation moves on.
//! 2. Take the `Preferable` candidates; if none, `LessPreferable`; if
//!    none, `Neutral`.
//! 3. Among the chosen tier, pick the lowest combined count (history +
//!    assignments earlier in this run), then the lowest driver id.
//! 4. Record the pick in the run's fairness tracker so later slots see it.
//!
//! Drivers without a submission for the week are neutral on every slot.
//! There is no per-driver weekly cap, no retry and no backtracking: one
//! deterministic pass. Identical inputs give identical schedules.
//!
//! # Complexity
//! O(s * d) where s=slots, d=drivers.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::catalog::SlotCatalog;
use crate::fairness::FairnessTracker;
use crate::models::{
    AcceptedSubmission, Assignment, Driver, DriverId, InfeasibleSlot, PreferenceLevel, TimeSlot,
    WeekId, WeeklySchedule,
};

/// Input container for one generation run.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    /// Week being scheduled.
    pub week: WeekId,
    /// Driver roster. Ineligible drivers are skipped.
    pub roster: Vec<Driver>,
    /// Accepted submissions by driver. Submissions for another week are
    /// ignored.
    pub submissions: BTreeMap<DriverId, AcceptedSubmission>,
    /// Slots to fill.
    pub catalog: SlotCatalog,
    /// Timestamp stamped on the schedule.
    pub generated_at: DateTime<Utc>,
    /// Whether this run replaces an earlier one.
    pub forced: bool,
}

impl ScheduleRequest {
    /// Creates a request with no submissions.
    pub fn new(
        week: WeekId,
        roster: Vec<Driver>,
        catalog: SlotCatalog,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            week,
            roster,
            submissions: BTreeMap::new(),
            catalog,
            generated_at,
            forced: false,
        }
    }

    /// Adds an accepted submission, replacing any earlier one from the
    /// same driver.
    pub fn with_submission(mut self, submission: AcceptedSubmission) -> Self {
        self.submissions
            .insert(submission.driver_id().clone(), submission);
        self
    }

    /// Marks the run as a forced regeneration.
    pub fn with_forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }
}

/// A driver's standing for one slot.
struct Candidate<'a> {
    id: &'a DriverId,
    level: PreferenceLevel,
}

/// Weekly driver-to-slot assignment engine.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc, Weekday};
/// use carpool_schedule::catalog::SlotCatalog;
/// use carpool_schedule::fairness::FairnessLedger;
/// use carpool_schedule::models::{Driver, TimeSlot, WeekId};
/// use carpool_schedule::scheduler::{AssignmentEngine, ScheduleRequest};
///
/// let week = WeekId::new(2026, 42).unwrap();
/// let catalog = SlotCatalog::new(vec![TimeSlot::morning(Weekday::Tue, "north")]);
/// let roster = vec![Driver::parent("p-1"), Driver::parent("p-2")];
/// let at = Utc.with_ymd_and_hms(2026, 10, 8, 9, 0, 0).unwrap();
///
/// let request = ScheduleRequest::new(week, roster, catalog, at);
/// let mut run = FairnessLedger::new().begin();
/// let schedule = AssignmentEngine::new().generate(&request, &mut run);
///
/// assert!(schedule.is_complete());
/// assert_eq!(run.pending_total(), 1);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignmentEngine;

impl AssignmentEngine {
    /// Creates an engine.
    pub fn new() -> Self {
        Self
    }

    /// Generates the week's schedule.
    ///
    /// `fairness` must start from the historical snapshot for this week;
    /// every assignment is recorded in it. Committing those counts is up to
    /// the caller.
    pub fn generate(
        &self,
        request: &ScheduleRequest,
        fairness: &mut FairnessTracker,
    ) -> WeeklySchedule {
        let mut schedule =
            WeeklySchedule::new(request.week, request.generated_at).with_forced(request.forced);
        let pool = eligible_pool(&request.roster);

        for slot in request.catalog.slots_for_week() {
            let candidates: Vec<Candidate<'_>> = pool
                .iter()
                .map(|&id| Candidate {
                    id,
                    level: preference_for(request, id, slot),
                })
                .collect();

            match select(&candidates, fairness) {
                Some((id, tier)) => {
                    let combined = fairness.combined_count(id);
                    debug!(%slot, driver = %id, %tier, combined, "assigned slot");
                    fairness.record_assignment(id);
                    schedule.add_assignment(Assignment::assigned(
                        slot.clone(),
                        id.clone(),
                        tier,
                        combined,
                    ));
                }
                None => {
                    let unavailable: Vec<DriverId> =
                        candidates.iter().map(|c| c.id.clone()).collect();
                    warn!(week = %request.week, %slot, "no eligible driver for slot");
                    schedule.add_assignment(Assignment::unassigned(slot.clone()));
                    schedule.add_infeasible(InfeasibleSlot::new(slot.clone(), unavailable));
                }
            }
        }

        info!(
            week = %request.week,
            slots = schedule.assignment_count(),
            filled = schedule.filled_count(),
            forced = request.forced,
            "generated weekly schedule"
        );
        schedule
    }
}

/// Eligible driver ids, ascending and unique.
fn eligible_pool(roster: &[Driver]) -> Vec<&DriverId> {
    let mut pool: Vec<&DriverId> = roster
        .iter()
        .filter(|d| d.is_eligible())
        .map(|d| &d.id)
        .collect();
    pool.sort();
    pool.dedup();
    pool
}

fn preference_for(request: &ScheduleRequest, id: &DriverId, slot: &TimeSlot) -> PreferenceLevel {
    request
        .submissions
        .get(id)
        .filter(|s| s.week() == request.week)
        .map(|s| s.preference(slot))
        .unwrap_or_default()
}

/// Picks the driver for a slot: first non-empty tier, then lowest combined
/// count, then lowest id. `None` when every candidate is unavailable.
fn select<'a>(
    candidates: &[Candidate<'a>],
    fairness: &FairnessTracker,
) -> Option<(&'a DriverId, PreferenceLevel)> {
    PreferenceLevel::TIERS.iter().find_map(|&tier| {
        candidates
            .iter()
            .filter(|c| c.level == tier)
            .min_by_key(|c| (fairness.combined_count(c.id), c.id))
            .map(|c| (c.id, tier))
    })
}
