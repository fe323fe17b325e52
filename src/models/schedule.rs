//! Weekly schedule (solution) model.
//!
//! A weekly schedule holds one assignment per catalog slot. A slot with no
//! eligible driver stays unassigned and is listed as an infeasible slot in
//! the summary for administrative follow-up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{DriverId, PreferenceLevel, TimeSlot, WeekId};

/// The generated schedule for one week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    /// Week this schedule covers.
    pub week: WeekId,
    /// Assignments in slot catalog order.
    pub assignments: Vec<Assignment>,
    /// When the engine produced this schedule.
    pub generated_at: DateTime<Utc>,
    /// Whether this run replaced an earlier result for the week.
    pub forced: bool,
    /// Monotonic version token, bumped on every store of this week.
    pub version: u64,
    /// Follow-up items for administrators.
    pub summary: ScheduleSummary,
}

/// A slot-driver assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Covered slot.
    pub slot: TimeSlot,
    /// Assigned driver, `None` when nobody was eligible.
    pub driver_id: Option<DriverId>,
    /// Preference tier the driver was picked from.
    pub tier: Option<PreferenceLevel>,
    /// Driver's combined count (history + earlier in run) when picked.
    pub combined_count: u32,
}

/// Administrative summary of a generated week.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    /// Slots nobody could take.
    pub infeasible_slots: Vec<InfeasibleSlot>,
}

/// A slot that had no eligible driver.
///
/// Not an error: generation continues, and the slot is surfaced here so an
/// external collaborator can request a backup driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfeasibleSlot {
    /// The unfilled slot.
    pub slot: TimeSlot,
    /// Eligible drivers who marked the slot unavailable.
    pub unavailable_drivers: Vec<DriverId>,
    /// Human-readable description.
    pub message: String,
}

impl Assignment {
    /// Creates a filled assignment.
    pub fn assigned(
        slot: TimeSlot,
        driver_id: DriverId,
        tier: PreferenceLevel,
        combined_count: u32,
    ) -> Self {
        Self {
            slot,
            driver_id: Some(driver_id),
            tier: Some(tier),
            combined_count,
        }
    }

    /// Creates an unfilled assignment.
    pub fn unassigned(slot: TimeSlot) -> Self {
        Self {
            slot,
            driver_id: None,
            tier: None,
            combined_count: 0,
        }
    }

    /// Whether a driver was assigned.
    #[inline]
    pub fn is_filled(&self) -> bool {
        self.driver_id.is_some()
    }
}

impl InfeasibleSlot {
    /// Creates an infeasible-slot entry.
    pub fn new(slot: TimeSlot, unavailable_drivers: Vec<DriverId>) -> Self {
        let message = if unavailable_drivers.is_empty() {
            format!("No eligible drivers for {slot}")
        } else {
            format!(
                "All {} eligible drivers marked {slot} unavailable",
                unavailable_drivers.len()
            )
        };
        Self {
            slot,
            unavailable_drivers,
            message,
        }
    }
}

impl WeeklySchedule {
    /// Creates an empty schedule.
    pub fn new(week: WeekId, generated_at: DateTime<Utc>) -> Self {
        Self {
            week,
            assignments: Vec::new(),
            generated_at,
            forced: false,
            version: 0,
            summary: ScheduleSummary::default(),
        }
    }

    /// Marks this schedule as a forced regeneration.
    pub fn with_forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    /// Adds an assignment.
    pub fn add_assignment(&mut self, assignment: Assignment) {
        self.assignments.push(assignment);
    }

    /// Records an infeasible slot.
    pub fn add_infeasible(&mut self, infeasible: InfeasibleSlot) {
        self.summary.infeasible_slots.push(infeasible);
    }

    /// Whether every slot has a driver.
    pub fn is_complete(&self) -> bool {
        self.assignments.iter().all(Assignment::is_filled)
    }

    /// Finds the assignment for a slot.
    pub fn assignment_for_slot(&self, slot: &TimeSlot) -> Option<&Assignment> {
        self.assignments.iter().find(|a| &a.slot == slot)
    }

    /// Driver assigned to a slot, if any.
    pub fn driver_for_slot(&self, slot: &TimeSlot) -> Option<&DriverId> {
        self.assignment_for_slot(slot)
            .and_then(|a| a.driver_id.as_ref())
    }

    /// Returns all assignments for a given driver.
    pub fn assignments_for_driver(&self, driver_id: &DriverId) -> Vec<&Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.driver_id.as_ref() == Some(driver_id))
            .collect()
    }

    /// Number of slots assigned to each driver this week.
    pub fn counts_by_driver(&self) -> BTreeMap<DriverId, u32> {
        let mut counts = BTreeMap::new();
        for id in self.assignments.iter().filter_map(|a| a.driver_id.as_ref()) {
            *counts.entry(id.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Slots left without a driver.
    pub fn unassigned_slots(&self) -> Vec<&TimeSlot> {
        self.assignments
            .iter()
            .filter(|a| !a.is_filled())
            .map(|a| &a.slot)
            .collect()
    }

    /// Number of assignments (filled or not).
    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    /// Number of filled assignments.
    pub fn filled_count(&self) -> usize {
        self.assignments.iter().filter(|a| a.is_filled()).count()
    }
}
