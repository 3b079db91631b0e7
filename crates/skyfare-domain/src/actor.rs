//! Who caused a booking status change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of the party that initiated a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Admin,
    System,
    PaymentGateway,
}

impl ActorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::System => "system",
            Self::PaymentGateway => "payment_gateway",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown actor type: {0:?}")]
pub struct UnknownActorType(pub String);

impl FromStr for ActorType {
    type Err = UnknownActorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            "payment_gateway" => Ok(Self::PaymentGateway),
            other => Err(UnknownActorType(other.to_owned())),
        }
    }
}

/// Identity recorded on every transition row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<String>,
    pub kind: ActorType,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            kind: ActorType::User,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            kind: ActorType::Admin,
        }
    }

    pub fn system() -> Self {
        Self {
            id: None,
            kind: ActorType::System,
        }
    }

    /// The payment provider, identified by the event that drove the change.
    pub fn payment_gateway(event_id: impl Into<String>) -> Self {
        Self {
            id: Some(event_id.into()),
            kind: ActorType::PaymentGateway,
        }
    }
}
