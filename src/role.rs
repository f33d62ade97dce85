//! Application roles.
//!
//! Roles are stored as lowercase strings in the provider's `user_roles`
//! table and compared by privilege rank when gating features.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Privilege level granted to an authenticated user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    SuperAdmin,
    Admin,
    #[default]
    User,
}

impl Role {
    /// Every role, most privileged first.
    pub const ALL: [Role; 3] = [Role::SuperAdmin, Role::Admin, Role::User];

    /// Wire name used by the role table.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "superadmin",
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Privilege rank. Higher grants more.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Admin => 1,
            Self::SuperAdmin => 2,
        }
    }

    /// Whether this role grants at least the privileges of `other`.
    #[must_use]
    pub fn at_least(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0:?}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            _ => Err(ParseRoleError(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[path = "role_test.rs"]
mod tests;
