//! Weekly assignment engine and schedule reporting.
//!
//! # Algorithm
//!
//! `AssignmentEngine` is a single greedy pass over the slot catalog. Each
//! slot goes to the best preference tier available, ties broken by the
//! lowest combined (historical + in-run) assignment count and then by
//! driver id. It is deterministic, not globally optimal.
//!
//! # Report
//!
//! `ScheduleReport` computes fill rate, per-driver load, load spread and
//! preference tier hits for a generated week.

mod assignment;
mod report;

pub use assignment::{AssignmentEngine, ScheduleRequest};
pub use report::ScheduleReport;
