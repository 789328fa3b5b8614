use crate::error::RentalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is performing a mutation. Supplied already authenticated by the
/// identity layer; the engine only checks roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    Renter(UserId),
    Staff(UserId),
    /// Automated flows such as payment reconciliation.
    System,
}

impl Actor {
    pub fn renter(id: &str) -> Self {
        Actor::Renter(UserId(id.to_string()))
    }

    pub fn staff(id: &str) -> Self {
        Actor::Staff(UserId(id.to_string()))
    }

    pub fn staff_id(&self) -> Option<&UserId> {
        match self {
            Actor::Staff(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Renter(id) => write!(f, "renter:{id}"),
            Actor::Staff(id) => write!(f, "staff:{id}"),
            Actor::System => f.write_str("system"),
        }
    }
}

impl FromStr for Actor {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("renter", id)) if !id.is_empty() => Ok(Actor::renter(id)),
            Some(("staff", id)) if !id.is_empty() => Ok(Actor::staff(id)),
            None if s == "system" => Ok(Actor::System),
            _ => Err(RentalError::Validation(format!("unrecognised actor '{s}'"))),
        }
    }
}

/// Per-call context passed explicitly into every mutating operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(actor: Actor, at: DateTime<Utc>) -> Self {
        Self { actor, at }
    }

    pub fn system(at: DateTime<Utc>) -> Self {
        Self::new(Actor::System, at)
    }
}
