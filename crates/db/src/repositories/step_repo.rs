//! Repository for the `workflow_steps` table.

use std::collections::HashMap;

use compliflow_core::types::DbId;
use compliflow_core::workflow::definition::StepDefinition;
use compliflow_core::workflow::machine::StepUpdate;
use compliflow_core::workflow::StepStatus;
use sqlx::{PgConnection, PgPool};

use crate::models::workflow::WorkflowStep;

/// Column list for workflow_steps queries.
const COLUMNS: &str = "id, workflow_id, step_order, department_id, assigned_to_id, \
    action_required, instructions, due_date, status, started_at, completed_at, \
    prior_active_secs, created_at, updated_at";

/// Provides persistence for workflow steps.
pub struct StepRepo;

impl StepRepo {
    /// Insert one step. Only called from the workflow creation transaction.
    pub async fn insert(
        conn: &mut PgConnection,
        workflow_id: DbId,
        step: &StepDefinition,
    ) -> Result<WorkflowStep, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_steps
                (workflow_id, step_order, department_id, assigned_to_id,
                 action_required, instructions, due_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowStep>(&query)
            .bind(workflow_id)
            .bind(step.step_order)
            .bind(step.department_id)
            .bind(step.assigned_to_id)
            .bind(step.action_required.as_str())
            .bind(&step.instructions)
            .bind(step.due_date)
            .fetch_one(conn)
            .await
    }

    /// All steps of a workflow, ordered by `step_order`.
    pub async fn list_for_workflow(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<Vec<WorkflowStep>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_steps
             WHERE workflow_id = $1
             ORDER BY step_order ASC"
        );
        sqlx::query_as::<_, WorkflowStep>(&query)
            .bind(workflow_id)
            .fetch_all(pool)
            .await
    }

    /// Same as [`list_for_workflow`](Self::list_for_workflow), inside an
    /// open transaction.
    pub async fn list_for_workflow_conn(
        conn: &mut PgConnection,
        workflow_id: DbId,
    ) -> Result<Vec<WorkflowStep>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_steps
             WHERE workflow_id = $1
             ORDER BY step_order ASC"
        );
        sqlx::query_as::<_, WorkflowStep>(&query)
            .bind(workflow_id)
            .fetch_all(conn)
            .await
    }

    /// Steps for many workflows in one round trip, grouped by workflow id.
    /// Each group is ordered by `step_order`.
    pub async fn list_for_workflows(
        pool: &PgPool,
        workflow_ids: &[DbId],
    ) -> Result<HashMap<DbId, Vec<WorkflowStep>>, sqlx::Error> {
        if workflow_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_steps
             WHERE workflow_id = ANY($1)
             ORDER BY workflow_id ASC, step_order ASC"
        );
        let rows = sqlx::query_as::<_, WorkflowStep>(&query)
            .bind(workflow_ids)
            .fetch_all(pool)
            .await?;

        let mut grouped: HashMap<DbId, Vec<WorkflowStep>> = HashMap::new();
        for row in rows {
            grouped.entry(row.workflow_id).or_default().push(row);
        }
        Ok(grouped)
    }

    /// Find one step, scoped to its workflow.
    pub async fn find(
        pool: &PgPool,
        workflow_id: DbId,
        step_id: DbId,
    ) -> Result<Option<WorkflowStep>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_steps
             WHERE workflow_id = $1 AND id = $2"
        );
        sqlx::query_as::<_, WorkflowStep>(&query)
            .bind(workflow_id)
            .bind(step_id)
            .fetch_optional(pool)
            .await
    }

    /// Write the engine's step changes.
    ///
    /// Deactivations are written before activations so the one-active-step
    /// index never sees two IN_PROGRESS rows mid-statement.
    pub async fn apply_updates(
        conn: &mut PgConnection,
        updates: &[StepUpdate],
    ) -> Result<(), sqlx::Error> {
        for update in order_for_write(updates) {
            sqlx::query(
                "UPDATE workflow_steps
                 SET status = $2, started_at = $3, completed_at = $4,
                     prior_active_secs = $5
                 WHERE id = $1",
            )
            .bind(update.step_id)
            .bind(update.status.as_str())
            .bind(update.started_at)
            .bind(update.completed_at)
            .bind(update.prior_active_secs)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

fn order_for_write(updates: &[StepUpdate]) -> Vec<&StepUpdate> {
    let mut ordered: Vec<&StepUpdate> = updates.iter().collect();
    ordered.sort_by_key(|u| u.status == StepStatus::InProgress);
    ordered
}
