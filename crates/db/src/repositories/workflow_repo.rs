//! Repository for the `workflows` and `workflow_reference_counters` tables.

use chrono::Datelike;
use compliflow_core::types::{DbId, Timestamp};
use compliflow_core::workflow::definition::{format_reference_number, WorkflowDefinition};
use compliflow_core::workflow::machine::InstanceUpdate;
use compliflow_core::workflow::WorkflowStatus;
use sqlx::{PgConnection, PgPool};

use crate::models::workflow::{Workflow, WorkflowFilter, WorkflowStep};
use crate::repositories::StepRepo;

/// Column list for workflows queries.
const COLUMNS: &str = "id, reference_number, name, description, linked_audit_id, status, \
    current_step_index, revision_target_step, created_by, started_at, completed_at, \
    created_at, updated_at";

/// Default page size for list queries.
const DEFAULT_LIMIT: i64 = 50;

/// Hard upper bound for list queries.
const MAX_LIMIT: i64 = 200;

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Provides persistence for workflow instances.
pub struct WorkflowRepo;

impl WorkflowRepo {
    /// Insert a validated definition with all of its steps in one
    /// transaction, allocating the next reference number for `now`'s year.
    pub async fn create(
        pool: &PgPool,
        definition: &WorkflowDefinition,
        created_by: DbId,
        now: Timestamp,
    ) -> Result<(Workflow, Vec<WorkflowStep>), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let year = now.year();
        let sequence = Self::next_reference_sequence(&mut tx, year).await?;
        let reference_number = format_reference_number(year, sequence);

        let query = format!(
            "INSERT INTO workflows
                (reference_number, name, description, linked_audit_id,
                 revision_target_step, created_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {COLUMNS}"
        );
        let workflow = sqlx::query_as::<_, Workflow>(&query)
            .bind(&reference_number)
            .bind(&definition.name)
            .bind(&definition.description)
            .bind(definition.linked_audit_id)
            .bind(definition.revision_target_step)
            .bind(created_by)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        let mut steps = Vec::with_capacity(definition.steps.len());
        for step in &definition.steps {
            steps.push(StepRepo::insert(&mut tx, workflow.id, step).await?);
        }

        tx.commit().await?;
        tracing::debug!(
            workflow_id = workflow.id,
            reference_number = %workflow.reference_number,
            step_count = steps.len(),
            "Workflow persisted",
        );
        Ok((workflow, steps))
    }

    /// Bump and return the per-year counter. Runs inside the creating
    /// transaction so the row lock serializes concurrent creations.
    async fn next_reference_sequence(
        conn: &mut PgConnection,
        year: i32,
    ) -> Result<i64, sqlx::Error> {
        let (value,): (i64,) = sqlx::query_as(
            "INSERT INTO workflow_reference_counters (year, last_value)
             VALUES ($1, 1)
             ON CONFLICT (year)
             DO UPDATE SET last_value = workflow_reference_counters.last_value + 1
             RETURNING last_value",
        )
        .bind(year)
        .fetch_one(conn)
        .await?;
        Ok(value)
    }

    /// Find a workflow by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Workflow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows WHERE id = $1");
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a workflow and take a row lock on it for the rest of the
    /// transaction.
    pub async fn lock_for_update(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<Workflow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// List workflows, newest first, optionally filtered by status and by
    /// departments that own at least one step.
    pub async fn list(
        pool: &PgPool,
        filter: &WorkflowFilter,
    ) -> Result<Vec<Workflow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflows w
             WHERE ($1::TEXT IS NULL OR w.status = $1)
               AND ($2::BIGINT IS NULL OR EXISTS (
                    SELECT 1 FROM workflow_steps s
                    WHERE s.workflow_id = w.id AND s.department_id = $2))
             ORDER BY w.created_at DESC, w.id DESC
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(&filter.status)
            .bind(filter.department_id)
            .bind(clamp_limit(filter.limit))
            .bind(clamp_offset(filter.offset))
            .fetch_all(pool)
            .await
    }

    /// Open workflows with at least one unfinished step routed to the user
    /// directly or, for unassigned steps, to the user's department.
    pub async fn list_for_actor(
        pool: &PgPool,
        user_id: DbId,
        department_id: Option<DbId>,
    ) -> Result<Vec<Workflow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflows w
             WHERE w.status IN ('PENDING', 'IN_PROGRESS')
               AND EXISTS (
                    SELECT 1 FROM workflow_steps s
                    WHERE s.workflow_id = w.id
                      AND s.status IN ('PENDING', 'IN_PROGRESS', 'RETURNED')
                      AND (s.assigned_to_id = $1
                           OR (s.assigned_to_id IS NULL AND s.department_id = $2)))
             ORDER BY w.created_at DESC, w.id DESC"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(user_id)
            .bind(department_id)
            .fetch_all(pool)
            .await
    }

    /// Workflows created at or after `since`, for analytics.
    pub async fn list_created_since(
        pool: &PgPool,
        since: Timestamp,
    ) -> Result<Vec<Workflow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflows
             WHERE created_at >= $1
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(since)
            .fetch_all(pool)
            .await
    }

    /// Workflows that are pending or running, for monitoring.
    pub async fn list_open(pool: &PgPool) -> Result<Vec<Workflow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflows
             WHERE status IN ($1, $2)
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(WorkflowStatus::Pending.as_str())
            .bind(WorkflowStatus::InProgress.as_str())
            .fetch_all(pool)
            .await
    }

    /// Write the engine's instance changes. `started_at` is only set once.
    pub async fn apply_update(
        conn: &mut PgConnection,
        id: DbId,
        update: &InstanceUpdate,
        started_at: Option<Timestamp>,
    ) -> Result<Workflow, sqlx::Error> {
        let query = format!(
            "UPDATE workflows SET
                status = $2,
                current_step_index = $3,
                completed_at = $4,
                started_at = COALESCE(started_at, $5)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .bind(update.status.as_str())
            .bind(update.current_step_index)
            .bind(update.completed_at)
            .bind(started_at)
            .fetch_one(conn)
            .await
    }

    /// Delete a workflow and its steps. Returns `true` if a row was removed.
    ///
    /// The approval log references steps with `ON DELETE RESTRICT`, so this
    /// fails once any action has been recorded; callers check first.
    pub async fn delete(conn: &mut PgConnection, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
        assert_eq!(clamp_offset(Some(-5)), 0);
    }
}
