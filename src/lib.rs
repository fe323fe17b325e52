//! Weekly carpool driver scheduling.
//!
//! Collects tiered driver preferences per week, validates them against
//! quotas and a submission cutoff, assigns one driver per time slot with
//! historical fairness balancing and drives each week through
//! `Open → Locked → Generated → Published`.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `Driver`, `TimeSlot`, `WeekId`,
//!   `WeeklySubmission`, `PreferenceLevel`, `WeeklySchedule`, `Assignment`
//! - **`catalog`**: The fixed set of slots scheduled each week
//! - **`validation`**: Quota, slot and cutoff checks on submissions
//! - **`fairness`**: Historical assignment counts with per-week commit and rollback
//! - **`scheduler`**: The greedy tiered `AssignmentEngine` and `ScheduleReport`
//! - **`lifecycle`**: `ScheduleLifecycleController`, the week state machine
//! - **`config`**: Environment configuration (`CARPOOL_*`)
//! - **`clock`**: Injectable time source
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::{TimeZone, Utc, Weekday};
//! use carpool_schedule::catalog::SlotCatalog;
//! use carpool_schedule::clock::{Clock, ManualClock};
//! use carpool_schedule::lifecycle::ScheduleLifecycleController;
//! use carpool_schedule::models::{Driver, PreferenceLevel, TimeSlot, WeekId, WeeklySubmission};
//!
//! let week = WeekId::new(2026, 42).unwrap();
//! let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 5, 8, 0, 0).unwrap()));
//! let controller = ScheduleLifecycleController::new(
//!     SlotCatalog::standard(&["north"]),
//!     vec![Driver::parent("ana"), Driver::parent("ben")],
//!     clock.clone(),
//! );
//!
//! let tue = TimeSlot::morning(Weekday::Tue, "north");
//! let submission = WeeklySubmission::new("ana", week, clock.now())
//!     .with_preference(tue.clone(), PreferenceLevel::Preferable);
//! controller.submit_preferences(&"ana".into(), week, submission).unwrap();
//!
//! controller.lock_week(week).unwrap();
//! let schedule = controller.generate_schedule(week, false).unwrap();
//! assert_eq!(schedule.driver_for_slot(&tue).map(|d| d.as_str()), Some("ana"));
//! controller.publish_schedule(week).unwrap();
//! ```

pub mod catalog;
pub mod clock;
pub mod config;
pub mod fairness;
pub mod lifecycle;
pub mod models;
pub mod scheduler;
pub mod validation;
