//! Repository for the append-only `workflow_approvals` table.
//!
//! There is deliberately no update or delete here; the table trigger
//! rejects both.

use std::collections::HashMap;

use compliflow_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::approval::{CreateApproval, WorkflowApproval};

/// Column list for workflow_approvals queries.
const COLUMNS: &str = "id, workflow_id, step_id, user_id, action, comments, \
    signature_content_type, signature_data, signature_sha256, created_at, updated_at";

/// Provides append and read access to the approval log.
pub struct ApprovalRepo;

impl ApprovalRepo {
    /// Append one approval row inside the acting transaction.
    pub async fn insert(
        conn: &mut PgConnection,
        input: &CreateApproval,
    ) -> Result<WorkflowApproval, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_approvals
                (workflow_id, step_id, user_id, action, comments,
                 signature_content_type, signature_data, signature_sha256)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowApproval>(&query)
            .bind(input.workflow_id)
            .bind(input.step_id)
            .bind(input.user_id)
            .bind(&input.action)
            .bind(&input.comments)
            .bind(&input.signature_content_type)
            .bind(&input.signature_data)
            .bind(&input.signature_sha256)
            .fetch_one(conn)
            .await
    }

    /// History of one step, oldest first.
    pub async fn list_for_step(
        pool: &PgPool,
        step_id: DbId,
    ) -> Result<Vec<WorkflowApproval>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_approvals
             WHERE step_id = $1
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, WorkflowApproval>(&query)
            .bind(step_id)
            .fetch_all(pool)
            .await
    }

    /// Full history of a workflow, oldest first.
    pub async fn list_for_workflow(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<Vec<WorkflowApproval>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_approvals
             WHERE workflow_id = $1
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, WorkflowApproval>(&query)
            .bind(workflow_id)
            .fetch_all(pool)
            .await
    }

    /// Workflow history keyed by step id, fetched in a single query.
    pub async fn grouped_by_step(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<HashMap<DbId, Vec<WorkflowApproval>>, sqlx::Error> {
        let rows = Self::list_for_workflow(pool, workflow_id).await?;
        let mut grouped: HashMap<DbId, Vec<WorkflowApproval>> = HashMap::new();
        for row in rows {
            grouped.entry(row.step_id).or_default().push(row);
        }
        Ok(grouped)
    }

    /// Number of recorded actions on a workflow.
    pub async fn count_for_workflow(
        conn: &mut PgConnection,
        workflow_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM workflow_approvals WHERE workflow_id = $1")
                .bind(workflow_id)
                .fetch_one(conn)
                .await?;
        Ok(count)
    }
}
