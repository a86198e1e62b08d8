//! Repository for the `workflow_documents` table.

use compliflow_core::types::DbId;
use sqlx::PgPool;

use crate::models::document::{CreateWorkflowDocument, WorkflowDocument};

/// Column list for workflow_documents queries.
const COLUMNS: &str =
    "id, workflow_id, name, storage_key, content_type, uploaded_by, created_at, updated_at";

/// Provides CRUD operations for workflow document references.
pub struct DocumentRepo;

impl DocumentRepo {
    /// Attach a document reference to a workflow.
    pub async fn create(
        pool: &PgPool,
        workflow_id: DbId,
        uploaded_by: DbId,
        input: &CreateWorkflowDocument,
    ) -> Result<WorkflowDocument, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_documents
                (workflow_id, name, storage_key, content_type, uploaded_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowDocument>(&query)
            .bind(workflow_id)
            .bind(&input.name)
            .bind(&input.storage_key)
            .bind(&input.content_type)
            .bind(uploaded_by)
            .fetch_one(pool)
            .await
    }

    /// List documents attached to a workflow, oldest first.
    pub async fn list_for_workflow(
        pool: &PgPool,
        workflow_id: DbId,
    ) -> Result<Vec<WorkflowDocument>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_documents
             WHERE workflow_id = $1
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, WorkflowDocument>(&query)
            .bind(workflow_id)
            .fetch_all(pool)
            .await
    }
}
