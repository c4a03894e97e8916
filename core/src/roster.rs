//! Staff roster and role classes.

use crate::types::StaffName;
use serde::{Deserialize, Serialize};

/// Selects which transition tables apply to a staff member.
/// Static for the lifetime of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleClass {
    /// Front-line staff whose home room is the first work room (Room A).
    FrontLineGroup1,
    /// Front-line staff whose home room is the second work room (Room C).
    FrontLineGroup2,
    Manager,
    Director,
}

impl RoleClass {
    pub const ALL: [RoleClass; 4] = [
        RoleClass::FrontLineGroup1,
        RoleClass::FrontLineGroup2,
        RoleClass::Manager,
        RoleClass::Director,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::FrontLineGroup1 => "front_line_group_1",
            Self::FrontLineGroup2 => "front_line_group_2",
            Self::Manager         => "manager",
            Self::Director        => "director",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub name: StaffName,
    pub role: RoleClass,
}

impl StaffMember {
    pub fn new(name: impl Into<StaffName>, role: RoleClass) -> Self {
        Self { name: name.into(), role }
    }
}

/// The eleven staff members of the reference deployment.
pub fn reference_roster() -> Vec<StaffMember> {
    use RoleClass::*;
    [
        ("AS1", FrontLineGroup1),
        ("AS2", FrontLineGroup1),
        ("AS3", FrontLineGroup2),
        ("AS4", FrontLineGroup2),
        ("AS5", FrontLineGroup1),
        ("AS6", FrontLineGroup1),
        ("AS7", FrontLineGroup2),
        ("AS8", FrontLineGroup2),
        ("Manager1", Manager),
        ("Manager2", Manager),
        ("Director1", Director),
    ]
    .into_iter()
    .map(|(name, role)| StaffMember::new(name, role))
    .collect()
}
