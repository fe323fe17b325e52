//! Carpool domain models.
//!
//! Provides the core data types for the weekly assignment problem and its
//! result.
//!
//! # Types
//!
//! | Type | Role |
//! |------|------|
//! | `Driver` | Roster member; only active parents drive |
//! | `TimeSlot` | Day, period and route needing one driver |
//! | `WeekId` | ISO week a submission or schedule belongs to |
//! | `WeeklySubmission` | One driver's tiered preferences for a week |
//! | `WeeklySchedule` | One assignment per slot, plus infeasible-slot summary |

mod driver;
mod preference;
mod schedule;
mod slot;
mod week;

pub use driver::{Driver, DriverId, DriverRole};
pub use preference::{AcceptedSubmission, PreferenceLevel, WeeklySubmission};
pub use schedule::{Assignment, InfeasibleSlot, ScheduleSummary, WeeklySchedule};
pub use slot::{Period, SlotParseError, TimeSlot};
pub use week::{WeekId, WeekParseError};
