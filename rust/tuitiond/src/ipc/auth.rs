//! Role gate for requests. Authentication itself happens in the host; the
//! sidecar only sees the resulting actor.

use crate::ipc::error::HandlerErr;
use crate::ipc::types::Request;
use crate::roster::StudentRecord;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Parent,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins see everyone; other actors only students linked to them.
    pub fn can_view(&self, student: &StudentRecord) -> bool {
        self.is_admin() || student.parent_id.as_deref() == Some(self.id.as_str())
    }
}

pub fn require_actor(req: &Request) -> Result<&Actor, HandlerErr> {
    match req.actor.as_ref() {
        Some(actor) if !actor.id.trim().is_empty() => Ok(actor),
        _ => Err(HandlerErr::new("unauthenticated", "request has no actor")),
    }
}

pub fn require_admin(req: &Request) -> Result<&Actor, HandlerErr> {
    let actor = require_actor(req)?;
    if !actor.is_admin() {
        return Err(HandlerErr::new("forbidden", "admin role required"));
    }
    Ok(actor)
}

pub fn ensure_can_view(actor: &Actor, student: &StudentRecord) -> Result<(), HandlerErr> {
    if actor.can_view(student) {
        Ok(())
    } else {
        Err(HandlerErr::new("forbidden", "student is not linked to this account"))
    }
}
