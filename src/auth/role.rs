//! Operator roles and the standing authorization policies built on them.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

/// Closed, ordered set of operator roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Superadmin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
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

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "superadmin" => Ok(Self::Superadmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A set of roles allowed to perform an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Policy {
    name: &'static str,
    allowed: &'static [Role],
}

/// Any authenticated operator.
pub const ANY_OPERATOR: Policy = Policy {
    name: "any operator",
    allowed: &[Role::Admin, Role::Superadmin],
};

/// Administration of other operator accounts.
pub const SUPERADMIN_ONLY: Policy = Policy {
    name: "superadmin only",
    allowed: &[Role::Superadmin],
};

impl Policy {
    #[must_use]
    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Message returned to callers whose role falls outside the policy.
    #[must_use]
    pub fn denial_message(&self) -> &'static str {
        if self.allowed.contains(&Role::Admin) {
            "Admin access required."
        } else {
            "Superadmin access required."
        }
    }
}
