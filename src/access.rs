//! Roles, capabilities and the acting principal
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[n(0)]
    Student,
    #[n(1)]
    Caretaker,
    #[n(2)]
    Warden,
    #[n(3)]
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SubmitLeave,
    ApproveLeave,
    ViewAllLeave,
    ManageUsers,
    ViewStatistics,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::SubmitLeave => "submit leave",
            Capability::ApproveLeave => "approve leave",
            Capability::ViewAllLeave => "view all leave",
            Capability::ManageUsers => "manage users",
            Capability::ViewStatistics => "view statistics",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// role -> capability table, the single source of truth for permissions
const STUDENT: &[Capability] = &[Capability::SubmitLeave];
const CARETAKER: &[Capability] = &[Capability::ApproveLeave, Capability::ViewAllLeave];
const WARDEN: &[Capability] = &[Capability::ApproveLeave, Capability::ViewAllLeave];
const ADMIN: &[Capability] = &[
    Capability::ApproveLeave,
    Capability::ViewAllLeave,
    Capability::ManageUsers,
    Capability::ViewStatistics,
];

impl Role {
    pub const ALL: [Role; 4] = [Role::Student, Role::Caretaker, Role::Warden, Role::Admin];

    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Role::Student => STUDENT,
            Role::Caretaker => CARETAKER,
            Role::Warden => WARDEN,
            Role::Admin => ADMIN,
        }
    }
    pub fn has_capability(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Caretaker => "caretaker",
            Role::Warden => "warden",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "caretaker" => Ok(Role::Caretaker),
            "warden" => Ok(Role::Warden),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {s}")),
        }
    }
}

/// The authenticated caller of an operation, as carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
    pub fn can(&self, capability: Capability) -> bool {
        self.role.has_capability(capability)
    }
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
