use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested action does not apply to the current workflow state
    /// (step not current, workflow never started, lost a race).
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// The workflow already reached a terminal status.
    #[error("Workflow closed: {0}")]
    WorkflowClosed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
