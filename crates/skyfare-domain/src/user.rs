//! User domain types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actor::ActorType;

/// Account role as asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
    SuperAdmin,
    AirlineAdmin,
    Finance,
    Ops,
    Support,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
            Self::AirlineAdmin => "airline_admin",
            Self::Finance => "finance",
            Self::Ops => "ops",
            Self::Support => "support",
        }
    }

    /// Staff may act on bookings they do not own.
    pub fn is_staff(self) -> bool {
        !matches!(self, Self::User)
    }

    /// Staff may force status transitions and run maintenance sweeps.
    pub fn can_operate(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin | Self::Ops)
    }

    /// How a transition made by this role is attributed in the history.
    pub fn actor_type(self) -> ActorType {
        if self.is_staff() {
            ActorType::Admin
        } else {
            ActorType::User
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown user role: {0:?}")]
pub struct UnknownUserRole(pub String);

impl FromStr for UserRole {
    type Err = UnknownUserRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            "airline_admin" => Ok(Self::AirlineAdmin),
            "finance" => Ok(Self::Finance),
            "ops" => Ok(Self::Ops),
            "support" => Ok(Self::Support),
            other => Err(UnknownUserRole(other.to_owned())),
        }
    }
}
