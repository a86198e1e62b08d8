//! Repositories for `departments` and `users`, plus the Postgres-backed
//! [`ActorDirectory`].

use async_trait::async_trait;
use compliflow_core::directory::{Actor, ActorDirectory};
use compliflow_core::error::CoreError;
use compliflow_core::types::DbId;
use sqlx::PgPool;

use crate::models::directory::{CreateDepartment, CreateUser, Department, User};

const DEPARTMENT_COLUMNS: &str = "id, name, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, department_id, role, is_active, created_at, updated_at";

/// Provides CRUD operations for departments.
pub struct DepartmentRepo;

impl DepartmentRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateDepartment,
    ) -> Result<Department, sqlx::Error> {
        let query = format!(
            "INSERT INTO departments (name) VALUES ($1) RETURNING {DEPARTMENT_COLUMNS}"
        );
        sqlx::query_as::<_, Department>(&query)
            .bind(&input.name)
            .fetch_one(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Department>, sqlx::Error> {
        let query = format!("SELECT {DEPARTMENT_COLUMNS} FROM departments ORDER BY name ASC");
        sqlx::query_as::<_, Department>(&query).fetch_all(pool).await
    }

    /// Which of `ids` name an existing department.
    pub async fn existing_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>("SELECT id FROM departments WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}

/// Provides CRUD operations for users.
pub struct UserRepo;

impl UserRepo {
    pub async fn create(pool: &PgPool, input: &CreateUser) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (username, department_id, role)
             VALUES ($1, $2, $3)
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.username)
            .bind(input.department_id)
            .bind(&input.role)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a user that has not been deactivated.
    pub async fn find_active(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND is_active");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Which of `ids` name an active user.
    pub async fn active_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>("SELECT id FROM users WHERE id = ANY($1) AND is_active")
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Mark a user inactive. Returns `true` if the row existed.
    pub async fn deactivate(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET is_active = false WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Resolves actors from the `users` table.
#[derive(Clone)]
pub struct PgActorDirectory {
    pool: PgPool,
}

impl PgActorDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActorDirectory for PgActorDirectory {
    async fn resolve(&self, user_id: DbId) -> Result<Option<Actor>, CoreError> {
        let user = UserRepo::find_active(&self.pool, user_id)
            .await
            .map_err(|e| CoreError::Internal(format!("Directory lookup failed: {e}")))?;
        Ok(user.map(|u| u.to_actor()))
    }
}
