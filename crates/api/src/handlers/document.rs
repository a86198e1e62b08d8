//! Handlers for workflow attachments.
//!
//! Only references are stored here; the bytes live in the external
//! document store.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use compliflow_core::error::CoreError;
use compliflow_core::types::DbId;
use compliflow_db::models::document::{CreateWorkflowDocument, WorkflowDocument};
use compliflow_db::repositories::DocumentRepo;

use crate::engine::workflow::find_workflow;
use crate::error::AppResult;
use crate::middleware::auth::CurrentActor;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/workflows/{id}/documents
pub async fn list(
    _actor: CurrentActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<WorkflowDocument>>>> {
    find_workflow(&state.pool, id).await?;
    let documents = DocumentRepo::list_for_workflow(&state.pool, id).await?;
    Ok(Json(DataResponse { data: documents }))
}

/// POST /api/v1/workflows/{id}/documents
pub async fn create(
    actor: CurrentActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CreateWorkflowDocument>,
) -> AppResult<impl IntoResponse> {
    if input.name.trim().is_empty() || input.storage_key.trim().is_empty() {
        return Err(CoreError::Validation("name and storage_key are required".into()).into());
    }
    find_workflow(&state.pool, id).await?;

    let document = DocumentRepo::create(&state.pool, id, actor.0.user_id, &input).await?;
    tracing::info!(
        workflow_id = id,
        document_id = document.id,
        user_id = actor.0.user_id,
        "Document attached"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: document })))
}
