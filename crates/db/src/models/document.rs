//! Workflow document attachment models.
//!
//! Only references are stored here; the bytes live in the external
//! document store under `storage_key`.

use compliflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `workflow_documents` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowDocument {
    pub id: DbId,
    pub workflow_id: DbId,
    pub name: String,
    pub storage_key: String,
    pub content_type: Option<String>,
    pub uploaded_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Request body for attaching a document reference.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowDocument {
    pub name: String,
    pub storage_key: String,
    pub content_type: Option<String>,
}
