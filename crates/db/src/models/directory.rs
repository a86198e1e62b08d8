//! Department and user models backing the actor directory.

use compliflow_core::directory::Actor;
use compliflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `departments` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Department {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub username: String,
    pub department_id: Option<DbId>,
    pub role: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn to_actor(&self) -> Actor {
        Actor::new(self.id, self.department_id).with_role(self.role.clone())
    }
}

/// DTO for creating a department.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDepartment {
    pub name: String,
}

/// DTO for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub department_id: Option<DbId>,
    pub role: String,
}
