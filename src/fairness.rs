//! Fairness accounting.
//!
//! Two distinct counters per driver:
//!
//! - **Committed** history in [`FairnessLedger`]: slots driven across all
//!   finalized weeks (the HistoricalRecord), plus the per-week deltas that
//!   produced it so a week can be rolled back.
//! - **Pending** in-run counts in [`FairnessTracker`]: assignments made so
//!   far in the current generation run, kept apart from history until the
//!   whole week is committed.
//!
//! A run starts from a snapshot ([`FairnessLedger::begin`]); the ledger is
//! never touched while the engine runs, so an aborted run leaves history
//! as it was.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{DriverId, WeekId};

/// Per-driver slot counts.
pub type DriverCounts = BTreeMap<DriverId, u32>;

/// Errors from committing or rolling back a week.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FairnessError {
    /// The week already has committed counts; roll it back first.
    #[error("fairness counts for {0} are already committed")]
    AlreadyCommitted(WeekId),
    /// Nothing was committed for the week.
    #[error("no fairness counts committed for {0}")]
    NotCommitted(WeekId),
}

/// Run-scoped fairness view used by the assignment engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FairnessTracker {
    historical: DriverCounts,
    pending: DriverCounts,
}

impl FairnessTracker {
    /// Creates a tracker over a historical snapshot.
    pub fn new(historical: DriverCounts) -> Self {
        Self {
            historical,
            pending: DriverCounts::new(),
        }
    }

    /// Cumulative historical assignments before this run.
    pub fn current_count(&self, driver_id: &DriverId) -> u32 {
        self.historical.get(driver_id).copied().unwrap_or(0)
    }

    /// Assignments made to the driver earlier in this run.
    pub fn pending_count(&self, driver_id: &DriverId) -> u32 {
        self.pending.get(driver_id).copied().unwrap_or(0)
    }

    /// History plus in-run assignments: the tie-break key.
    pub fn combined_count(&self, driver_id: &DriverId) -> u32 {
        self.current_count(driver_id) + self.pending_count(driver_id)
    }

    /// Counts one more in-run assignment for the driver.
    pub fn record_assignment(&mut self, driver_id: &DriverId) {
        *self.pending.entry(driver_id.clone()).or_insert(0) += 1;
    }

    /// In-run increments so far.
    pub fn pending(&self) -> &DriverCounts {
        &self.pending
    }

    /// Total assignments made in this run.
    pub fn pending_total(&self) -> u32 {
        self.pending.values().sum()
    }
}

/// Persisted historical fairness state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairnessLedger {
    totals: DriverCounts,
    weeks: BTreeMap<WeekId, DriverCounts>,
}

impl FairnessLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds historical counts carried over from before this ledger
    /// existed. Seeded counts are not tied to any week and cannot be
    /// rolled back.
    pub fn with_history(mut self, history: impl IntoIterator<Item = (DriverId, u32)>) -> Self {
        for (id, count) in history {
            if count > 0 {
                *self.totals.entry(id).or_insert(0) += count;
            }
        }
        self
    }

    /// Cumulative committed count for a driver.
    pub fn historical_count(&self, driver_id: &DriverId) -> u32 {
        self.totals.get(driver_id).copied().unwrap_or(0)
    }

    /// All committed totals.
    pub fn totals(&self) -> &DriverCounts {
        &self.totals
    }

    /// Whether a week has committed counts.
    pub fn is_committed(&self, week: WeekId) -> bool {
        self.weeks.contains_key(&week)
    }

    /// Deltas committed for a week.
    pub fn week_deltas(&self, week: WeekId) -> Option<&DriverCounts> {
        self.weeks.get(&week)
    }

    /// Starts a run from the current history.
    pub fn begin(&self) -> FairnessTracker {
        FairnessTracker::new(self.totals.clone())
    }

    /// Starts a run from history without the given week's own deltas.
    ///
    /// A regeneration must not see the result it is about to replace.
    pub fn begin_excluding(&self, week: WeekId) -> FairnessTracker {
        let mut snapshot = self.totals.clone();
        if let Some(deltas) = self.weeks.get(&week) {
            subtract(&mut snapshot, deltas);
        }
        FairnessTracker::new(snapshot)
    }

    /// Persists a run's increments as the week's deltas.
    pub fn commit(&mut self, week: WeekId, run: &FairnessTracker) -> Result<(), FairnessError> {
        if self.weeks.contains_key(&week) {
            return Err(FairnessError::AlreadyCommitted(week));
        }
        self.apply(week, run);
        Ok(())
    }

    /// Reverses a committed week, returning the deltas removed.
    pub fn rollback(&mut self, week: WeekId) -> Result<DriverCounts, FairnessError> {
        let deltas = self
            .weeks
            .remove(&week)
            .ok_or(FairnessError::NotCommitted(week))?;
        subtract(&mut self.totals, &deltas);
        debug!(%week, "rolled back fairness counts");
        Ok(deltas)
    }

    /// Rolls back the week if committed, then commits the new run.
    ///
    /// Cannot fail halfway: either both steps apply or neither does.
    pub fn replace(&mut self, week: WeekId, run: &FairnessTracker) -> Option<DriverCounts> {
        let previous = self.rollback(week).ok();
        self.apply(week, run);
        previous
    }

    fn apply(&mut self, week: WeekId, run: &FairnessTracker) {
        for (id, &n) in run.pending() {
            *self.totals.entry(id.clone()).or_insert(0) += n;
        }
        self.weeks.insert(week, run.pending().clone());
        debug!(%week, assignments = run.pending_total(), "committed fairness counts");
    }
}

fn subtract(totals: &mut DriverCounts, deltas: &DriverCounts) {
    for (id, &n) in deltas {
        if let Some(total) = totals.get_mut(id) {
            *total = total.saturating_sub(n);
            if *total == 0 {
                totals.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> DriverId {
        DriverId::new(s)
    }

    fn week(n: u32) -> WeekId {
        WeekId::new(2026, n).unwrap()
    }

    fn run_with(ledger: &FairnessLedger, ids: &[&str]) -> FairnessTracker {
        let mut run = ledger.begin();
        for s in ids {
            run.record_assignment(&id(s));
        }
        run
    }

    #[test]
    fn test_tracker_counts() {
        let mut t = FairnessTracker::new(DriverCounts::from([(id("a"), 2)]));
        assert_eq!(t.current_count(&id("a")), 2);
        assert_eq!(t.combined_count(&id("a")), 2);
        assert_eq!(t.current_count(&id("b")), 0);

        t.record_assignment(&id("a"));
        t.record_assignment(&id("b"));
        t.record_assignment(&id("b"));
        assert_eq!(t.current_count(&id("a")), 2);
        assert_eq!(t.combined_count(&id("a")), 3);
        assert_eq!(t.pending_count(&id("b")), 2);
        assert_eq!(t.pending_total(), 3);
    }

    #[test]
    fn test_run_does_not_touch_ledger() {
        let ledger = FairnessLedger::new().with_history([(id("a"), 4)]);
        let run = run_with(&ledger, &["a", "a"]);
        assert_eq!(run.combined_count(&id("a")), 6);
        assert_eq!(ledger.historical_count(&id("a")), 4);
        drop(run);
        assert_eq!(ledger.historical_count(&id("a")), 4);
    }

    #[test]
    fn test_commit_and_rollback() {
        let mut ledger = FairnessLedger::new().with_history([(id("a"), 1)]);
        let run = run_with(&ledger, &["a", "b", "b"]);
        ledger.commit(week(42), &run).unwrap();

        assert!(ledger.is_committed(week(42)));
        assert_eq!(ledger.historical_count(&id("a")), 2);
        assert_eq!(ledger.historical_count(&id("b")), 2);

        let removed = ledger.rollback(week(42)).unwrap();
        assert_eq!(removed[&id("b")], 2);
        assert_eq!(ledger.historical_count(&id("a")), 1);
        assert_eq!(ledger.historical_count(&id("b")), 0);
        assert!(!ledger.totals().contains_key(&id("b")));
        assert!(!ledger.is_committed(week(42)));
    }

    #[test]
    fn test_double_commit_rejected() {
        let mut ledger = FairnessLedger::new();
        let run = run_with(&ledger, &["a"]);
        ledger.commit(week(42), &run).unwrap();
        assert_eq!(
            ledger.commit(week(42), &run),
            Err(FairnessError::AlreadyCommitted(week(42)))
        );
        assert_eq!(ledger.historical_count(&id("a")), 1);
    }

    #[test]
    fn test_rollback_uncommitted() {
        let mut ledger = FairnessLedger::new();
        assert_eq!(
            ledger.rollback(week(42)),
            Err(FairnessError::NotCommitted(week(42)))
        );
    }

    #[test]
    fn test_begin_excluding_hides_own_week() {
        let mut ledger = FairnessLedger::new();
        ledger.commit(week(41), &run_with(&ledger, &["a"])).unwrap();
        ledger.commit(week(42), &run_with(&ledger, &["a", "b"])).unwrap();

        let regen = ledger.begin_excluding(week(42));
        assert_eq!(regen.current_count(&id("a")), 1);
        assert_eq!(regen.current_count(&id("b")), 0);

        let fresh = ledger.begin_excluding(week(43));
        assert_eq!(fresh.current_count(&id("a")), 2);
    }

    #[test]
    fn test_replace_has_no_double_counting() {
        let mut ledger = FairnessLedger::new();
        let first = run_with(&ledger, &["a", "b"]);
        assert!(ledger.replace(week(42), &first).is_none());

        let again = run_with(&ledger.clone(), &["a", "b"]);
        let previous = ledger.replace(week(42), &again).unwrap();
        assert_eq!(previous.len(), 2);
        assert_eq!(ledger.historical_count(&id("a")), 1);
        assert_eq!(ledger.historical_count(&id("b")), 1);

        let different = run_with(&ledger, &["c"]);
        ledger.replace(week(42), &different);
        assert_eq!(ledger.historical_count(&id("a")), 0);
        assert_eq!(ledger.historical_count(&id("c")), 1);
        assert_eq!(ledger.week_deltas(week(42)).unwrap().len(), 1);
    }

    #[test]
    fn test_seeded_history_survives_rollback() {
        let mut ledger = FairnessLedger::new().with_history([(id("a"), 3), (id("z"), 0)]);
        assert!(!ledger.totals().contains_key(&id("z")));
        ledger.commit(week(42), &run_with(&ledger, &["a"])).unwrap();
        ledger.rollback(week(42)).unwrap();
        assert_eq!(ledger.historical_count(&id("a")), 3);
    }

    #[test]
    fn test_ledger_serializes() {
        let mut ledger = FairnessLedger::new();
        ledger.commit(week(42), &run_with(&ledger, &["a"])).unwrap();
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json["totals"]["a"], 1);
        assert_eq!(json["weeks"]["2026-W42"]["a"], 1);
        let back: FairnessLedger = serde_json::from_value(json).unwrap();
        assert_eq!(back, ledger);
    }
}
