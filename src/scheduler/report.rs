//! Schedule quality metrics.
//!
//! Summarizes a generated week for administrators and reporting
//! collaborators.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Fill Rate | Filled slots / total slots |
//! | Load Spread | Max minus min slots per eligible driver |
//! | Preferred Rate | Filled slots taken at `Preferable` / filled slots |
//! | Tier Counts | Filled slots per preference tier |
//! | Idle Drivers | Eligible drivers with no slot this week |

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Driver, DriverId, PreferenceLevel, TimeSlot, WeeklySchedule};

/// Weekly schedule indicators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleReport {
    /// Slots in the schedule.
    pub total_slots: usize,
    /// Slots with a driver.
    pub filled_slots: usize,
    /// Fraction of slots filled (0.0..1.0). 1.0 for an empty schedule.
    pub fill_rate: f64,
    /// Slots left open for backup-driver follow-up.
    pub infeasible_slots: Vec<TimeSlot>,
    /// Slots per eligible driver, including drivers with none.
    pub load_by_driver: BTreeMap<DriverId, u32>,
    /// Highest weekly load of any eligible driver.
    pub max_load: u32,
    /// Lowest weekly load of any eligible driver.
    pub min_load: u32,
    /// Filled slots per preference tier.
    pub tier_counts: BTreeMap<PreferenceLevel, usize>,
    /// Fraction of filled slots taken at `Preferable` (0.0..1.0).
    pub preferred_rate: f64,
    /// Eligible drivers without any slot.
    pub idle_drivers: Vec<DriverId>,
}

impl ScheduleReport {
    /// Computes the report for a schedule against its roster.
    pub fn calculate(schedule: &WeeklySchedule, roster: &[Driver]) -> Self {
        let mut load_by_driver: BTreeMap<DriverId, u32> = roster
            .iter()
            .filter(|d| d.is_eligible())
            .map(|d| (d.id.clone(), 0))
            .collect();
        for (id, n) in schedule.counts_by_driver() {
            *load_by_driver.entry(id).or_insert(0) += n;
        }

        let mut tier_counts = BTreeMap::new();
        for tier in schedule.assignments.iter().filter_map(|a| a.tier) {
            *tier_counts.entry(tier).or_insert(0) += 1;
        }

        let total_slots = schedule.assignment_count();
        let filled_slots = schedule.filled_count();
        let fill_rate = if total_slots == 0 {
            1.0
        } else {
            filled_slots as f64 / total_slots as f64
        };
        let preferred_rate = if filled_slots == 0 {
            0.0
        } else {
            tier_counts
                .get(&PreferenceLevel::Preferable)
                .copied()
                .unwrap_or(0) as f64
                / filled_slots as f64
        };

        let max_load = load_by_driver.values().max().copied().unwrap_or(0);
        let min_load = load_by_driver.values().min().copied().unwrap_or(0);
        let idle_drivers = load_by_driver
            .iter()
            .filter(|(_, &n)| n == 0)
            .map(|(id, _)| id.clone())
            .collect();

        Self {
            total_slots,
            filled_slots,
            fill_rate,
            infeasible_slots: schedule
                .summary
                .infeasible_slots
                .iter()
                .map(|i| i.slot.clone())
                .collect(),
            load_by_driver,
            max_load,
            min_load,
            tier_counts,
            preferred_rate,
            idle_drivers,
        }
    }

    /// Max minus min weekly load.
    pub fn load_spread(&self) -> u32 {
        self.max_load - self.min_load
    }

    /// Whether the schedule meets the given quality thresholds.
    pub fn meets_thresholds(&self, min_fill_rate: f64, max_spread: u32) -> bool {
        self.fill_rate >= min_fill_rate && self.load_spread() <= max_spread
    }
}
