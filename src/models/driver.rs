//! Driver model.
//!
//! Drivers are the parents who perform carpool duty. The roster is owned by
//! the registration collaborator; this crate only reads it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strongly typed driver identifier.
///
/// Ascending `DriverId` order is the final tie-break key of the assignment
/// engine, so the ordering must stay a plain lexicographic string order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    /// Creates a driver identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DriverId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DriverId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A community member who may be scheduled to drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    /// Unique driver identifier.
    pub id: DriverId,
    /// Human-readable name.
    pub name: String,
    /// Community role.
    pub role: DriverRole,
    /// Whether the driver currently takes part in the rotation.
    pub active: bool,
}

/// Community role classification.
///
/// Only `Parent` carries driving duty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverRole {
    /// Parent driver.
    Parent,
    /// Community administrator (schedules, does not drive).
    Admin,
    /// Guardian or student account without driving duty.
    Guardian,
    /// Domain-specific role.
    Custom(String),
}

impl DriverRole {
    /// Whether this role may be assigned driving slots.
    pub fn can_drive(&self) -> bool {
        matches!(self, DriverRole::Parent)
    }
}

impl Driver {
    /// Creates an active driver with the given role.
    pub fn new(id: impl Into<DriverId>, role: DriverRole) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            role,
            active: true,
        }
    }

    /// Creates an active parent driver.
    pub fn parent(id: impl Into<DriverId>) -> Self {
        Self::new(id, DriverRole::Parent)
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Whether this driver belongs in the eligibility pool at all:
    /// active and holding a driving role.
    pub fn is_eligible(&self) -> bool {
        self.active && self.role.can_drive()
    }
}
