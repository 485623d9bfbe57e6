//! Role authorization as a pure predicate.
//!
//! There is no hidden "current user": callers pass the actor explicitly and
//! get an allow/deny back. The gateway derives the actor from headers set by
//! the out-of-scope auth layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BotError, Result};

/// Marketplace roles, least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    Admin,
}

impl Role {
    fn rank(&self) -> u8 {
        match self {
            Role::User => 0,
            Role::Agent => 1,
            Role::Admin => 2,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "agent" => Ok(Role::Agent),
            "admin" => Ok(Role::Admin),
            other => Err(BotError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Who is making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Allow iff the caller's role is at least `required`.
/// Returns [`BotError::Authorization`] on deny so call sites can `?` it.
pub fn authorize(caller: Role, required: Role) -> Result<()> {
    if caller.rank() >= required.rank() {
        Ok(())
    } else {
        Err(BotError::Authorization)
    }
}
