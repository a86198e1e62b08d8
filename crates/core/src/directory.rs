//! Actor directory seam.
//!
//! The engine never derives identity on its own: the API layer resolves the
//! authenticated principal through an [`ActorDirectory`] and passes the
//! resulting [`Actor`] into every engine call.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;
use crate::types::DbId;

/// An authenticated principal with its department membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub user_id: DbId,
    /// Users outside any department can only act on steps assigned to them.
    pub department_id: Option<DbId>,
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(user_id: DbId, department_id: Option<DbId>) -> Self {
        Self {
            user_id,
            department_id,
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Resolves a user id to an [`Actor`].
///
/// Returns `Ok(None)` for unknown or deactivated users.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn resolve(&self, user_id: DbId) -> Result<Option<Actor>, CoreError>;
}

/// Fixed, map-backed directory for tests and local tooling.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    actors: HashMap<DbId, Actor>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actors.insert(actor.user_id, actor);
        self
    }
}

#[async_trait]
impl ActorDirectory for StaticDirectory {
    async fn resolve(&self, user_id: DbId) -> Result<Option<Actor>, CoreError> {
        Ok(self.actors.get(&user_id).cloned())
    }
}
