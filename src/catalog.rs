//! Slot catalog.
//!
//! The community-wide set of recurring slots that each need one driver per
//! week. The catalog is sorted and deduplicated on construction, so
//! [`SlotCatalog::slots_for_week`] always yields day, then period, then
//! route order regardless of how the slots were supplied.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::models::{Period, TimeSlot};

/// School days covered by [`SlotCatalog::standard`].
pub const SCHOOL_DAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// The fixed set of weekly coverage slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<TimeSlot>", into = "Vec<TimeSlot>")]
pub struct SlotCatalog {
    slots: Vec<TimeSlot>,
}

impl From<Vec<TimeSlot>> for SlotCatalog {
    fn from(slots: Vec<TimeSlot>) -> Self {
        Self::new(slots)
    }
}

impl From<SlotCatalog> for Vec<TimeSlot> {
    fn from(catalog: SlotCatalog) -> Self {
        catalog.slots
    }
}

impl SlotCatalog {
    /// Creates a catalog from any collection of slots.
    pub fn new(slots: impl IntoIterator<Item = TimeSlot>) -> Self {
        let mut slots: Vec<TimeSlot> = slots.into_iter().collect();
        slots.sort();
        slots.dedup();
        Self { slots }
    }

    /// Monday to Friday, morning and afternoon, for every route.
    pub fn standard<R: AsRef<str>>(routes: &[R]) -> Self {
        let mut slots = Vec::with_capacity(SCHOOL_DAYS.len() * 2 * routes.len());
        for day in SCHOOL_DAYS {
            for period in [Period::Morning, Period::Afternoon] {
                for route in routes {
                    slots.push(TimeSlot::new(day, period, route.as_ref()));
                }
            }
        }
        Self::new(slots)
    }

    /// Adds a slot, keeping catalog order.
    pub fn with_slot(mut self, slot: TimeSlot) -> Self {
        if let Err(pos) = self.slots.binary_search(&slot) {
            self.slots.insert(pos, slot);
        }
        self
    }

    /// Slots in generation order.
    pub fn slots_for_week(&self) -> &[TimeSlot] {
        &self.slots
    }

    /// Whether the slot is part of the catalog.
    pub fn contains(&self, slot: &TimeSlot) -> bool {
        self.slots.binary_search(slot).is_ok()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the catalog has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
