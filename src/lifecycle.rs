//! Weekly schedule lifecycle.
//!
//! Each week moves through:
//!
//! ```text
//! Open ──cutoff/lock──▶ Locked ──generate──▶ Generated ──publish──▶ Published
//!                                               ▲                       │
//!                                               └────generate(force)────┘
//! ```
//!
//! # Concurrency
//! All mutable state sits behind one mutex. A generation run claims its
//! week under the lock, runs the engine without holding it, then re-takes
//! the lock once to roll back the week's previous fairness counts, commit
//! the new ones, store the schedule and move the state. A second run for a
//! claimed week fails fast with [`LifecycleError::ConcurrentRegeneration`];
//! other weeks are unaffected.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::SlotCatalog;
use crate::clock::Clock;
use crate::config::Config;
use crate::fairness::{FairnessError, FairnessLedger, FairnessTracker};
use crate::models::{
    AcceptedSubmission, Driver, DriverId, WeekId, WeeklySchedule, WeeklySubmission,
};
use crate::scheduler::{AssignmentEngine, ScheduleRequest};
use crate::validation::{PreferenceValidator, ValidationError};

/// Lifecycle state of one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekState {
    /// Accepting preference submissions.
    Open,
    /// Cutoff passed; submissions frozen.
    Locked,
    /// A schedule exists but is not yet visible to consumers.
    Generated,
    /// Schedule exposed to consumers.
    Published,
}

impl fmt::Display for WeekState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WeekState::Open => "open",
            WeekState::Locked => "locked",
            WeekState::Generated => "generated",
            WeekState::Published => "published",
        };
        f.write_str(s)
    }
}

/// How an eligible driver without an accepted submission is scheduled.
///
/// Applies to every missing submission, whether the driver was late or
/// never answered. Only `TreatAsNeutral` keeps the engine's default of a
/// fully neutral driver; the other policies replace it for the whole week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateSubmissionPolicy {
    /// Neutral on every slot: available, lowest priority tier.
    #[default]
    TreatAsNeutral,
    /// Left out of the week's pool entirely.
    Exclude,
    /// Most recent earlier week's accepted preferences, else neutral.
    ReusePriorWeek,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLateSubmissionPolicyError;

impl FromStr for LateSubmissionPolicy {
    type Err = ParseLateSubmissionPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neutral" | "treat_as_neutral" => Ok(LateSubmissionPolicy::TreatAsNeutral),
            "exclude" => Ok(LateSubmissionPolicy::Exclude),
            "reuse" | "reuse_prior_week" => Ok(LateSubmissionPolicy::ReusePriorWeek),
            _ => Err(ParseLateSubmissionPolicyError),
        }
    }
}

/// Lifecycle operation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// Another generation for the week is in progress. Retryable.
    #[error("a schedule generation for {0} is already in progress")]
    ConcurrentRegeneration(WeekId),
    /// The week already has a schedule and regeneration was not forced.
    #[error("schedule for {0} already generated; force a regeneration to replace it")]
    AlreadyGenerated(WeekId),
    /// The operation is not allowed in the week's current state.
    #[error("cannot {action} {week} while it is {state}")]
    InvalidTransition {
        week: WeekId,
        state: WeekState,
        action: &'static str,
    },
    /// No schedule exists for the week.
    #[error("no schedule generated for {0}")]
    NotGenerated(WeekId),
    /// Driver is not on the roster.
    #[error("unknown driver '{0}'")]
    UnknownDriver(DriverId),
    /// Driver is inactive or holds a non-driving role.
    #[error("driver '{0}' is not eligible to drive")]
    IneligibleDriver(DriverId),
    /// Submission driver or week does not match the request.
    #[error("submission belongs to {driver} for {week}")]
    SubmissionMismatch { driver: DriverId, week: WeekId },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Fairness(#[from] FairnessError),
}

impl LifecycleError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LifecycleError::ConcurrentRegeneration(_))
    }
}

#[derive(Debug, Clone)]
struct WeekRecord {
    state: WeekState,
    schedule: Option<WeeklySchedule>,
    version: u64,
    /// Token of the run currently holding the week.
    claim: Option<u64>,
}

impl Default for WeekRecord {
    fn default() -> Self {
        Self {
            state: WeekState::Open,
            schedule: None,
            version: 0,
            claim: None,
        }
    }
}

#[derive(Debug, Default)]
struct Store {
    roster: Vec<Driver>,
    /// Accepted submissions per driver, by week. Later weeks supersede
    /// earlier ones without deleting them.
    submissions: BTreeMap<DriverId, BTreeMap<WeekId, AcceptedSubmission>>,
    weeks: BTreeMap<WeekId, WeekRecord>,
    ledger: FairnessLedger,
    next_claim: u64,
}

/// Releases a week's claim when a run ends, including by panic.
///
/// Only the run that took the claim can release it; a finished run never
/// clears a later run's claim.
struct GenerationClaim<'a> {
    store: &'a Mutex<Store>,
    week: WeekId,
    token: u64,
}

impl Drop for GenerationClaim<'_> {
    fn drop(&mut self) {
        let mut store = lock(self.store);
        if let Some(record) = store.weeks.get_mut(&self.week) {
            release(record, self.token);
        }
    }
}

fn release(record: &mut WeekRecord, token: u64) {
    if record.claim == Some(token) {
        record.claim = None;
    }
}

/// A claimed run: inputs snapshotted, engine not yet run.
struct PendingRun<'a> {
    claim: GenerationClaim<'a>,
    request: ScheduleRequest,
    fairness: FairnessTracker,
}

fn lock(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrates submissions, generation and publication per week.
pub struct ScheduleLifecycleController {
    catalog: SlotCatalog,
    validator: PreferenceValidator,
    engine: AssignmentEngine,
    late_policy: LateSubmissionPolicy,
    clock: Arc<dyn Clock>,
    store: Mutex<Store>,
}

impl ScheduleLifecycleController {
    /// Creates a controller with default quota and cutoff rules.
    pub fn new(catalog: SlotCatalog, roster: Vec<Driver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            validator: PreferenceValidator::new().with_catalog(catalog.clone()),
            catalog,
            engine: AssignmentEngine::new(),
            late_policy: LateSubmissionPolicy::default(),
            clock,
            store: Mutex::new(Store {
                roster,
                ..Store::default()
            }),
        }
    }

    /// Creates a controller from environment configuration.
    pub fn from_config(config: &Config, roster: Vec<Driver>, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.catalog(), roster, clock)
            .with_validator(config.validator())
            .with_late_policy(config.late_submission_policy)
    }

    /// Replaces the submission validator.
    pub fn with_validator(mut self, validator: PreferenceValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Sets the policy for drivers without an accepted submission.
    pub fn with_late_policy(mut self, policy: LateSubmissionPolicy) -> Self {
        self.late_policy = policy;
        self
    }

    /// Starts from existing fairness history.
    pub fn with_ledger(self, ledger: FairnessLedger) -> Self {
        lock(&self.store).ledger = ledger;
        self
    }

    /// Replaces the driver roster. Affects later submissions and runs.
    pub fn set_roster(&self, roster: Vec<Driver>) {
        lock(&self.store).roster = roster;
    }

    /// Slot catalog in use.
    pub fn catalog(&self) -> &SlotCatalog {
        &self.catalog
    }

    /// Current state of a week. Open weeks past their cutoff lock here.
    pub fn state(&self, week: WeekId) -> WeekState {
        let now = self.clock.now();
        let mut store = lock(&self.store);
        self.refresh(&mut store, week, now).state
    }

    /// Validates and stores a driver's preferences for a week.
    ///
    /// A later accepted submission for the same week replaces the earlier
    /// one.
    pub fn submit_preferences(
        &self,
        driver_id: &DriverId,
        week: WeekId,
        submission: WeeklySubmission,
    ) -> Result<AcceptedSubmission, LifecycleError> {
        if &submission.driver_id != driver_id || submission.week != week {
            return Err(LifecycleError::SubmissionMismatch {
                driver: submission.driver_id,
                week: submission.week,
            });
        }

        let now = self.clock.now();
        let mut store = lock(&self.store);

        match store.roster.iter().find(|d| &d.id == driver_id) {
            None => return Err(LifecycleError::UnknownDriver(driver_id.clone())),
            Some(d) if !d.is_eligible() => {
                return Err(LifecycleError::IneligibleDriver(driver_id.clone()));
            }
            Some(_) => {}
        }

        let mut submission = submission;
        submission.submitted_at = now;
        let accepted = self.validator.validate(submission, now).map_err(|err| {
            warn!(driver = %driver_id, %week, error = %err, "rejected preference submission");
            err
        })?;

        let state = self.refresh(&mut store, week, now).state;
        if state != WeekState::Open {
            return Err(LifecycleError::InvalidTransition {
                week,
                state,
                action: "submit preferences for",
            });
        }

        store
            .submissions
            .entry(driver_id.clone())
            .or_default()
            .insert(week, accepted.clone());
        Ok(accepted)
    }

    /// Closes a week to submissions ahead of its cutoff.
    pub fn lock_week(&self, week: WeekId) -> Result<(), LifecycleError> {
        let now = self.clock.now();
        let mut store = lock(&self.store);
        let record = self.refresh(&mut store, week, now);
        match record.state {
            WeekState::Open => {
                record.state = WeekState::Locked;
                info!(%week, "week locked");
                Ok(())
            }
            state => Err(LifecycleError::InvalidTransition {
                week,
                state,
                action: "lock",
            }),
        }
    }

    /// Generates (or with `force`, regenerates) the week's schedule.
    ///
    /// On success the week is `Generated`, the schedule is stored with a
    /// new version and the run's fairness counts replace any earlier run's
    /// for the week. On error nothing changes.
    pub fn generate_schedule(
        &self,
        week: WeekId,
        force: bool,
    ) -> Result<WeeklySchedule, LifecycleError> {
        let PendingRun {
            claim,
            request,
            mut fairness,
        } = self.begin_generation(week, force)?;

        let schedule = self.engine.generate(&request, &mut fairness);
        self.finish_generation(&claim, &request, schedule, &fairness)
    }

    /// Exposes a generated schedule to consumers.
    pub fn publish_schedule(&self, week: WeekId) -> Result<WeeklySchedule, LifecycleError> {
        let now = self.clock.now();
        let mut store = lock(&self.store);
        let record = self.refresh(&mut store, week, now);
        if record.claim.is_some() {
            return Err(LifecycleError::ConcurrentRegeneration(week));
        }
        if record.state != WeekState::Generated {
            return Err(LifecycleError::InvalidTransition {
                week,
                state: record.state,
                action: "publish",
            });
        }
        let Some(schedule) = record.schedule.as_mut() else {
            return Err(LifecycleError::NotGenerated(week));
        };
        record.version += 1;
        schedule.version = record.version;
        record.state = WeekState::Published;
        info!(%week, version = record.version, "schedule published");
        Ok(schedule.clone())
    }

    /// The week's current schedule.
    pub fn get_schedule(&self, week: WeekId) -> Result<WeeklySchedule, LifecycleError> {
        lock(&self.store)
            .weeks
            .get(&week)
            .and_then(|r| r.schedule.clone())
            .ok_or(LifecycleError::NotGenerated(week))
    }

    /// A driver's accepted submission for a week, if any.
    pub fn submission(&self, driver_id: &DriverId, week: WeekId) -> Option<AcceptedSubmission> {
        lock(&self.store)
            .submissions
            .get(driver_id)
            .and_then(|by_week| by_week.get(&week))
            .cloned()
    }

    /// Committed historical count for a driver.
    pub fn historical_count(&self, driver_id: &DriverId) -> u32 {
        lock(&self.store).ledger.historical_count(driver_id)
    }

    /// Snapshot of the fairness ledger.
    pub fn ledger(&self) -> FairnessLedger {
        lock(&self.store).ledger.clone()
    }

    /// Auto-locks an open week whose cutoff has passed.
    fn refresh<'s>(
        &self,
        store: &'s mut Store,
        week: WeekId,
        now: DateTime<Utc>,
    ) -> &'s mut WeekRecord {
        let record = store.weeks.entry(week).or_default();
        if record.state == WeekState::Open && self.validator.deadline().is_past(week, now) {
            record.state = WeekState::Locked;
            info!(%week, "week locked at cutoff");
        }
        record
    }

    fn begin_generation(
        &self,
        week: WeekId,
        force: bool,
    ) -> Result<PendingRun<'_>, LifecycleError> {
        let now = self.clock.now();
        let mut guard = lock(&self.store);
        let token = guard.next_claim;
        let record = self.refresh(&mut guard, week, now);

        if record.claim.is_some() {
            warn!(%week, "rejected concurrent schedule generation");
            return Err(LifecycleError::ConcurrentRegeneration(week));
        }
        let replacing = match record.state {
            WeekState::Open => {
                return Err(LifecycleError::InvalidTransition {
                    week,
                    state: WeekState::Open,
                    action: "generate",
                });
            }
            WeekState::Locked => false,
            WeekState::Generated | WeekState::Published if force => true,
            WeekState::Generated | WeekState::Published => {
                return Err(LifecycleError::AlreadyGenerated(week));
            }
        };
        record.claim = Some(token);
        guard.next_claim += 1;

        let store = &*guard;
        let request = self.build_request(store, week, now).with_forced(replacing);
        let fairness = store.ledger.begin_excluding(week);
        drop(guard);

        Ok(PendingRun {
            claim: GenerationClaim {
                store: &self.store,
                week,
                token,
            },
            request,
            fairness,
        })
    }

    /// Commits a claimed run in one step: fairness rollback and commit,
    /// schedule store, state change and claim release.
    ///
    /// A first run for a week whose counts are already in the ledger fails
    /// with `AlreadyCommitted` and changes nothing.
    fn finish_generation(
        &self,
        claim: &GenerationClaim<'_>,
        request: &ScheduleRequest,
        mut schedule: WeeklySchedule,
        fairness: &FairnessTracker,
    ) -> Result<WeeklySchedule, LifecycleError> {
        let week = claim.week;
        let mut guard = lock(&self.store);
        let store = &mut *guard;

        if request.forced && store.ledger.is_committed(week) {
            store.ledger.rollback(week)?;
            info!(%week, "rolled back previous run's fairness counts");
        }
        store.ledger.commit(week, fairness)?;

        let record = store.weeks.entry(week).or_default();
        record.version += 1;
        schedule.version = record.version;
        record.schedule = Some(schedule.clone());
        record.state = WeekState::Generated;
        release(record, claim.token);

        if !schedule.summary.infeasible_slots.is_empty() {
            warn!(
                %week,
                infeasible = schedule.summary.infeasible_slots.len(),
                "schedule has unfilled slots"
            );
        }
        Ok(schedule)
    }

    fn build_request(&self, store: &Store, week: WeekId, now: DateTime<Utc>) -> ScheduleRequest {
        let mut roster = Vec::with_capacity(store.roster.len());
        let mut submissions = BTreeMap::new();

        for driver in &store.roster {
            let history = store.submissions.get(&driver.id);
            let current = history.and_then(|by_week| by_week.get(&week)).cloned();
            let chosen = match (current, self.late_policy) {
                (Some(s), _) => Some(s),
                (None, LateSubmissionPolicy::TreatAsNeutral) => None,
                (None, LateSubmissionPolicy::Exclude) => {
                    if driver.is_eligible() {
                        info!(driver = %driver.id, %week, "excluded without submission");
                    }
                    continue;
                }
                (None, LateSubmissionPolicy::ReusePriorWeek) => history
                    .and_then(|by_week| by_week.range(..week).next_back())
                    .map(|(_, prior)| prior.carried_to(week)),
            };
            if let Some(s) = chosen {
                submissions.insert(driver.id.clone(), s);
            }
            roster.push(driver.clone());
        }

        ScheduleRequest {
            week,
            roster,
            submissions,
            catalog: self.catalog.clone(),
            generated_at: now,
            forced: false,
        }
    }
}

impl fmt::Debug for ScheduleLifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleLifecycleController")
            .field("slots", &self.catalog.len())
            .field("late_policy", &self.late_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{DriverRole, PreferenceLevel, TimeSlot};
    use chrono::{Duration, TimeZone, Weekday};
    use envconfig::Envconfig;
    use std::sync::Barrier;

    fn week() -> WeekId {
        WeekId::new(2026, 42).unwrap()
    }

    // Cutoff for 2026-W42: Wed 2026-10-07 17:00 UTC.
    fn before_cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 6, 12, 0, 0).unwrap()
    }

    fn after_cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 8, 9, 0, 0).unwrap()
    }

    fn tue_morning() -> TimeSlot {
        TimeSlot::morning(Weekday::Tue, "north")
    }

    fn id(s: &str) -> DriverId {
        DriverId::new(s)
    }

    fn setup(roster: &[&str]) -> (ScheduleLifecycleController, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(before_cutoff()));
        let controller = ScheduleLifecycleController::new(
            SlotCatalog::standard(&["north"]),
            roster.iter().map(|&d| Driver::parent(d)).collect(),
            clock.clone(),
        );
        (controller, clock)
    }

    fn submission(
        driver: &str,
        week: WeekId,
        prefs: &[(TimeSlot, PreferenceLevel)],
    ) -> WeeklySubmission {
        let mut s = WeeklySubmission::new(driver, week, before_cutoff());
        for (slot, level) in prefs {
            s.set_preference(slot.clone(), *level);
        }
        s
    }

    fn submit(
        c: &ScheduleLifecycleController,
        driver: &str,
        prefs: &[(TimeSlot, PreferenceLevel)],
    ) -> Result<AcceptedSubmission, LifecycleError> {
        c.submit_preferences(&id(driver), week(), submission(driver, week(), prefs))
    }

    // ---------------------------------------------------------------
    // Submissions
    // ---------------------------------------------------------------

    #[test]
    fn test_submit_and_read_back() {
        let (c, _) = setup(&["A"]);
        submit(&c, "A", &[(tue_morning(), PreferenceLevel::Preferable)]).unwrap();
        let stored = c.submission(&id("A"), week()).unwrap();
        assert_eq!(stored.preference(&tue_morning()), PreferenceLevel::Preferable);
        assert_eq!(c.state(week()), WeekState::Open);
    }

    #[test]
    fn test_submission_stamped_with_clock_time() {
        let (c, clock) = setup(&["A"]);
        let mut s = submission("A", week(), &[]);
        s.submitted_at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let accepted = c.submit_preferences(&id("A"), week(), s).unwrap();

        assert_eq!(accepted.submission().submitted_at, before_cutoff());
        assert_eq!(
            c.submission(&id("A"), week()).unwrap().submission().submitted_at,
            before_cutoff()
        );

        // A back-dated submission after the cutoff is still late.
        clock.set(after_cutoff());
        let mut late = submission("A", week(), &[]);
        late.submitted_at = before_cutoff();
        assert!(matches!(
            c.submit_preferences(&id("A"), week(), late),
            Err(LifecycleError::Validation(ValidationError::DeadlineMissed { .. }))
        ));
    }

    #[test]
    fn test_resubmission_replaces() {
        let (c, _) = setup(&["A"]);
        submit(&c, "A", &[(tue_morning(), PreferenceLevel::Preferable)]).unwrap();
        submit(&c, "A", &[(tue_morning(), PreferenceLevel::Unavailable)]).unwrap();
        assert_eq!(
            c.submission(&id("A"), week()).unwrap().preference(&tue_morning()),
            PreferenceLevel::Unavailable
        );
    }

    #[test]
    fn test_quota_exceeded_not_stored() {
        let (c, _) = setup(&["A"]);
        let days = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu];
        let prefs: Vec<(TimeSlot, PreferenceLevel)> = days
            .iter()
            .map(|&d| (TimeSlot::morning(d, "north"), PreferenceLevel::Preferable))
            .collect();
        let err = submit(&c, "A", &prefs).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::Validation(ValidationError::QuotaExceeded {
                level: PreferenceLevel::Preferable,
                count: 4,
                limit: 3,
            })
        );
        assert!(!err.is_retryable());
        assert!(c.submission(&id("A"), week()).is_none());
    }

    #[test]
    fn test_late_submission_rejected() {
        let (c, clock) = setup(&["A"]);
        clock.set(after_cutoff());
        let err = submit(&c, "A", &[]).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::DeadlineMissed { .. })
        ));
        assert_eq!(c.state(week()), WeekState::Locked);
    }

    #[test]
    fn test_submission_to_manually_locked_week() {
        let (c, _) = setup(&["A"]);
        c.lock_week(week()).unwrap();
        assert_eq!(
            submit(&c, "A", &[]),
            Err(LifecycleError::InvalidTransition {
                week: week(),
                state: WeekState::Locked,
                action: "submit preferences for",
            })
        );
    }

    #[test]
    fn test_unknown_and_ineligible_drivers() {
        let clock = Arc::new(ManualClock::new(before_cutoff()));
        let c = ScheduleLifecycleController::new(
            SlotCatalog::standard(&["north"]),
            vec![
                Driver::parent("A").with_active(false),
                Driver::new("B", DriverRole::Admin),
            ],
            clock,
        );
        assert_eq!(submit(&c, "A", &[]), Err(LifecycleError::IneligibleDriver(id("A"))));
        assert_eq!(submit(&c, "B", &[]), Err(LifecycleError::IneligibleDriver(id("B"))));
        assert_eq!(submit(&c, "X", &[]), Err(LifecycleError::UnknownDriver(id("X"))));
    }

    #[test]
    fn test_submission_mismatch() {
        let (c, _) = setup(&["A", "B"]);
        let err = c
            .submit_preferences(&id("A"), week(), submission("B", week(), &[]))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::SubmissionMismatch { .. }));

        let err = c
            .submit_preferences(&id("A"), week(), submission("A", week().next(), &[]))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::SubmissionMismatch { .. }));
    }

    #[test]
    fn test_slot_outside_catalog_rejected() {
        let (c, _) = setup(&["A"]);
        let saturday = TimeSlot::morning(Weekday::Sat, "north");
        let err = submit(&c, "A", &[(saturday, PreferenceLevel::Preferable)]).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::UnknownSlot { .. })
        ));
    }

    // ---------------------------------------------------------------
    // State transitions
    // ---------------------------------------------------------------

    #[test]
    fn test_full_lifecycle() {
        let (c, clock) = setup(&["A", "B", "C"]);
        submit(&c, "A", &[(tue_morning(), PreferenceLevel::Unavailable)]).unwrap();
        submit(&c, "B", &[(tue_morning(), PreferenceLevel::Preferable)]).unwrap();
        submit(&c, "C", &[(tue_morning(), PreferenceLevel::Neutral)]).unwrap();

        clock.set(after_cutoff());
        assert_eq!(c.state(week()), WeekState::Locked);

        let generated = c.generate_schedule(week(), false).unwrap();
        assert_eq!(c.state(week()), WeekState::Generated);
        assert_eq!(generated.driver_for_slot(&tue_morning()), Some(&id("B")));
        assert_eq!(generated.version, 1);
        assert!(!generated.forced);
        assert_eq!(generated.generated_at, after_cutoff());
        assert!(generated.is_complete());

        let published = c.publish_schedule(week()).unwrap();
        assert_eq!(c.state(week()), WeekState::Published);
        assert_eq!(published.version, 2);
        assert_eq!(published.assignments, generated.assignments);
        assert_eq!(c.get_schedule(week()).unwrap(), published);

        // Ten slots handed out, committed to history.
        let total: u32 = c.ledger().totals().values().sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_generate_open_week_rejected() {
        let (c, _) = setup(&["A"]);
        assert_eq!(
            c.generate_schedule(week(), false),
            Err(LifecycleError::InvalidTransition {
                week: week(),
                state: WeekState::Open,
                action: "generate",
            })
        );
        assert_eq!(c.get_schedule(week()), Err(LifecycleError::NotGenerated(week())));
    }

    #[test]
    fn test_generate_after_manual_lock() {
        let (c, _) = setup(&["A"]);
        c.lock_week(week()).unwrap();
        assert!(c.lock_week(week()).is_err());
        assert!(c.generate_schedule(week(), false).is_ok());
    }

    #[test]
    fn test_generate_twice_requires_force() {
        let (c, clock) = setup(&["A"]);
        clock.set(after_cutoff());
        c.generate_schedule(week(), false).unwrap();
        assert_eq!(
            c.generate_schedule(week(), false),
            Err(LifecycleError::AlreadyGenerated(week()))
        );
        c.publish_schedule(week()).unwrap();
        assert_eq!(
            c.generate_schedule(week(), false),
            Err(LifecycleError::AlreadyGenerated(week()))
        );
    }

    #[test]
    fn test_publish_requires_generated() {
        let (c, clock) = setup(&["A"]);
        assert!(matches!(
            c.publish_schedule(week()),
            Err(LifecycleError::InvalidTransition { action: "publish", .. })
        ));
        clock.set(after_cutoff());
        c.generate_schedule(week(), false).unwrap();
        c.publish_schedule(week()).unwrap();
        assert!(matches!(
            c.publish_schedule(week()),
            Err(LifecycleError::InvalidTransition {
                state: WeekState::Published,
                ..
            })
        ));
    }

    // ---------------------------------------------------------------
    // Forced regeneration
    // ---------------------------------------------------------------

    #[test]
    fn test_force_regenerate_twice_is_stable() {
        let (c, clock) = setup(&["A", "B", "C"]);
        submit(&c, "A", &[(tue_morning(), PreferenceLevel::Preferable)]).unwrap();
        clock.set(after_cutoff());

        let first = c.generate_schedule(week(), false).unwrap();
        c.publish_schedule(week()).unwrap();
        let ledger_after_first = c.ledger().totals().clone();

        let second = c.generate_schedule(week(), true).unwrap();
        let ledger_after_second = c.ledger().totals().clone();
        let third = c.generate_schedule(week(), true).unwrap();

        assert_eq!(second.assignments, first.assignments);
        assert_eq!(third.assignments, first.assignments);
        assert_eq!(ledger_after_second, ledger_after_first);
        assert_eq!(c.ledger().totals(), &ledger_after_first);
        assert!(second.forced && third.forced);
        assert!(third.version > second.version);
        assert_eq!(c.state(week()), WeekState::Generated);
    }

    #[test]
    fn test_force_regenerate_replaces_counts() {
        let (c, clock) = setup(&["A", "B"]);
        submit(&c, "A", &[(tue_morning(), PreferenceLevel::Preferable)]).unwrap();
        clock.set(after_cutoff());
        c.generate_schedule(week(), false).unwrap();

        // Roster shrinks: B alone must now carry every slot.
        c.set_roster(vec![Driver::parent("B")]);
        let regenerated = c.generate_schedule(week(), true).unwrap();
        assert_eq!(regenerated.counts_by_driver()[&id("B")], 10);
        assert_eq!(c.historical_count(&id("A")), 0);
        assert_eq!(c.historical_count(&id("B")), 10);
    }

    #[test]
    fn test_history_carries_into_next_week() {
        let (c, clock) = setup(&["A", "B"]);
        submit(&c, "A", &[(tue_morning(), PreferenceLevel::Preferable)]).unwrap();
        clock.set(after_cutoff());
        c.generate_schedule(week(), false).unwrap();
        assert_eq!(c.historical_count(&id("A")), 5);
        assert_eq!(c.historical_count(&id("B")), 5);

        // Next week, seed A ahead by pushing history directly.
        let ledger = c.ledger().with_history([(id("A"), 1)]);
        let c = c.with_ledger(ledger);
        clock.advance(Duration::days(7));
        let next = c.generate_schedule(week().next(), false).unwrap();
        let first_slot = &c.catalog().slots_for_week()[0];
        assert_eq!(next.driver_for_slot(first_slot), Some(&id("B")));
        assert_eq!(c.historical_count(&id("B")), 10);
    }

    // ---------------------------------------------------------------
    // Concurrency
    // ---------------------------------------------------------------

    #[test]
    fn test_claimed_week_rejects_second_run() {
        let (c, clock) = setup(&["A"]);
        clock.set(after_cutoff());

        let pending = c.begin_generation(week(), false).unwrap();
        let err = c.generate_schedule(week(), true).unwrap_err();
        assert_eq!(err, LifecycleError::ConcurrentRegeneration(week()));
        assert!(err.is_retryable());
        assert_eq!(
            c.publish_schedule(week()),
            Err(LifecycleError::ConcurrentRegeneration(week()))
        );

        // Other weeks are unaffected.
        clock.advance(Duration::days(7));
        assert!(c.generate_schedule(week().next(), false).is_ok());

        drop(pending);
        assert!(c.generate_schedule(week(), false).is_ok());
    }

    #[test]
    fn test_abandoned_run_leaves_state_untouched() {
        let (c, clock) = setup(&["A"]);
        clock.set(after_cutoff());
        let pending = c.begin_generation(week(), false).unwrap();
        drop(pending);

        assert_eq!(c.state(week()), WeekState::Locked);
        assert!(c.ledger().totals().is_empty());
        assert_eq!(c.get_schedule(week()), Err(LifecycleError::NotGenerated(week())));
    }

    #[test]
    fn test_finished_run_does_not_release_newer_claim() {
        let (c, clock) = setup(&["A", "B"]);
        clock.set(after_cutoff());

        let PendingRun {
            claim: first,
            request,
            mut fairness,
        } = c.begin_generation(week(), false).unwrap();
        let schedule = c.engine.generate(&request, &mut fairness);
        c.finish_generation(&first, &request, schedule, &fairness).unwrap();

        // A forced run claims the week before the first run's claim drops.
        let second = c.begin_generation(week(), true).unwrap();
        drop(first);

        assert_eq!(
            c.begin_generation(week(), true).err(),
            Some(LifecycleError::ConcurrentRegeneration(week()))
        );
        assert_eq!(
            c.publish_schedule(week()),
            Err(LifecycleError::ConcurrentRegeneration(week()))
        );

        drop(second);
        assert!(c.generate_schedule(week(), true).is_ok());
    }

    #[test]
    fn test_week_already_in_ledger_rejected() {
        let mut ledger = FairnessLedger::new();
        ledger.commit(week(), &FairnessLedger::new().begin()).unwrap();
        let (c, clock) = setup(&["A"]);
        let c = c.with_ledger(ledger);
        clock.set(after_cutoff());

        let err = c.generate_schedule(week(), false).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::Fairness(FairnessError::AlreadyCommitted(week()))
        );
        assert!(!err.is_retryable());
        assert_eq!(c.state(week()), WeekState::Locked);
        assert_eq!(c.get_schedule(week()), Err(LifecycleError::NotGenerated(week())));

        // The claim was released: a retry fails the same way, not as a race.
        assert_eq!(c.generate_schedule(week(), false).unwrap_err(), err);
    }

    #[test]
    fn test_simultaneous_force_regenerate() {
        let (c, clock) = setup(&["A", "B", "C"]);
        clock.set(after_cutoff());
        c.generate_schedule(week(), false).unwrap();
        c.publish_schedule(week()).unwrap();

        let barrier = Barrier::new(2);
        let results: Vec<Result<WeeklySchedule, LifecycleError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        c.generate_schedule(week(), true)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });

        // Either one run lost the race or they ran back to back; never an
        // interleaving.
        assert!(results.iter().any(|r| r.is_ok()));
        for r in &results {
            if let Err(e) = r {
                assert_eq!(e, &LifecycleError::ConcurrentRegeneration(week()));
            }
        }
        let total: u32 = c.ledger().totals().values().sum();
        assert_eq!(total, 10);
        assert_eq!(c.state(week()), WeekState::Generated);
    }

    #[test]
    fn test_different_weeks_generate_in_parallel() {
        let (c, clock) = setup(&["A", "B"]);
        clock.set(after_cutoff() + Duration::days(14));
        let weeks = [week(), week().next(), week().next().next()];

        std::thread::scope(|s| {
            for w in weeks {
                let c = &c;
                s.spawn(move || c.generate_schedule(w, false).unwrap());
            }
        });

        for w in weeks {
            assert_eq!(c.state(w), WeekState::Generated);
        }
        let total: u32 = c.ledger().totals().values().sum();
        assert_eq!(total, 30);
    }

    // ---------------------------------------------------------------
    // Missing submissions
    // ---------------------------------------------------------------

    fn policy_setup(
        policy: LateSubmissionPolicy,
    ) -> (ScheduleLifecycleController, Arc<ManualClock>) {
        let (c, clock) = setup(&["A", "B"]);
        (c.with_late_policy(policy), clock)
    }

    #[test]
    fn test_missing_submission_treated_as_neutral() {
        let (c, clock) = policy_setup(LateSubmissionPolicy::TreatAsNeutral);
        submit(&c, "A", &[(tue_morning(), PreferenceLevel::Unavailable)]).unwrap();
        clock.set(after_cutoff());
        let s = c.generate_schedule(week(), false).unwrap();
        assert_eq!(s.driver_for_slot(&tue_morning()), Some(&id("B")));
        assert_eq!(s.counts_by_driver().len(), 2);
    }

    #[test]
    fn test_missing_submission_excluded() {
        let (c, clock) = policy_setup(LateSubmissionPolicy::Exclude);
        submit(&c, "A", &[]).unwrap();
        clock.set(after_cutoff());
        let s = c.generate_schedule(week(), false).unwrap();
        assert_eq!(s.counts_by_driver()[&id("A")], 10);
        assert!(s.assignments_for_driver(&id("B")).is_empty());
    }

    #[test]
    fn test_missing_submission_reuses_prior_week() {
        let (c, clock) = policy_setup(LateSubmissionPolicy::ReusePriorWeek);
        let prior = week().previous();
        clock.set(before_cutoff() - Duration::days(7));
        c.submit_preferences(
            &id("B"),
            prior,
            submission("B", prior, &[(tue_morning(), PreferenceLevel::Unavailable)]),
        )
        .unwrap();

        clock.set(after_cutoff());
        let s = c.generate_schedule(week(), false).unwrap();
        // B's prior-week answer still excludes B from Tuesday morning.
        assert_eq!(s.driver_for_slot(&tue_morning()), Some(&id("A")));
    }

    #[test]
    fn test_late_policy_parse() {
        assert_eq!(
            "neutral".parse::<LateSubmissionPolicy>(),
            Ok(LateSubmissionPolicy::TreatAsNeutral)
        );
        assert_eq!(
            "Exclude".parse::<LateSubmissionPolicy>(),
            Ok(LateSubmissionPolicy::Exclude)
        );
        assert_eq!(
            "reuse_prior_week".parse::<LateSubmissionPolicy>(),
            Ok(LateSubmissionPolicy::ReusePriorWeek)
        );
        assert_eq!(
            "later".parse::<LateSubmissionPolicy>(),
            Err(ParseLateSubmissionPolicyError)
        );
    }

    #[test]
    fn test_from_config() {
        let vars: std::collections::HashMap<String, String> =
            [("CARPOOL_ROUTES".to_string(), "north,south".to_string())]
                .into_iter()
                .collect();
        let config = Config::init_from_hashmap(&vars).unwrap();
        let clock = Arc::new(ManualClock::new(after_cutoff()));
        let c = ScheduleLifecycleController::from_config(&config, vec![Driver::parent("A")], clock);
        assert_eq!(c.catalog().len(), 20);
        let s = c.generate_schedule(week(), false).unwrap();
        assert_eq!(s.filled_count(), 20);
    }
}
