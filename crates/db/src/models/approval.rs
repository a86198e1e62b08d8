//! Approval log models.

use compliflow_core::types::{DbId, Timestamp};
use compliflow_core::workflow::action::ApprovalAction;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `workflow_approvals` table.
///
/// Signature bytes are never serialized; responses carry the digest and
/// content type instead.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowApproval {
    pub id: DbId,
    pub workflow_id: DbId,
    pub step_id: DbId,
    pub user_id: DbId,
    pub action: String,
    pub comments: Option<String>,
    pub signature_content_type: Option<String>,
    #[serde(skip_serializing)]
    pub signature_data: Option<Vec<u8>>,
    pub signature_sha256: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for appending an approval row.
#[derive(Debug, Clone)]
pub struct CreateApproval {
    pub workflow_id: DbId,
    pub step_id: DbId,
    pub user_id: DbId,
    pub action: String,
    pub comments: Option<String>,
    pub signature_content_type: Option<String>,
    pub signature_data: Option<Vec<u8>>,
    pub signature_sha256: Option<String>,
}

impl CreateApproval {
    /// Flatten a typed action into its row shape.
    pub fn from_action(
        workflow_id: DbId,
        step_id: DbId,
        user_id: DbId,
        action: &ApprovalAction,
    ) -> Self {
        let signature = action.signature();
        Self {
            workflow_id,
            step_id,
            user_id,
            action: action.kind().as_str().to_string(),
            comments: action.comments().map(str::to_string),
            signature_content_type: signature.map(|s| s.content_type.clone()),
            signature_data: signature.map(|s| s.data.clone()),
            signature_sha256: signature.map(|s| s.sha256_hex()),
        }
    }
}
