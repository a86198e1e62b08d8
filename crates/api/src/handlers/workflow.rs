//! Handlers for the `/workflows` resource.
//!
//! Creation, lifecycle actions, evidence trail reads, and the analytics and
//! monitoring views.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use compliflow_core::error::CoreError;
use compliflow_core::types::DbId;
use compliflow_core::workflow::action::{ActionKind, ActionRequest, SignaturePayload};
use compliflow_core::workflow::analytics::{analyze_performance, clamp_days_back, monitor};
use compliflow_core::workflow::definition::CreateWorkflowInput;
use compliflow_core::workflow::WorkflowStatus;
use compliflow_db::models::approval::WorkflowApproval;
use compliflow_db::models::document::WorkflowDocument;
use compliflow_db::models::workflow::{Workflow, WorkflowFilter, WorkflowStep};
use compliflow_db::repositories::{ApprovalRepo, DocumentRepo, StepRepo, WorkflowRepo};
use serde::{Deserialize, Serialize};

use crate::engine::workflow::{self as engine, WorkflowWithSteps};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentActor;
use crate::query::AnalyticsParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /workflows/{id}/steps/{step_id}/approve`.
///
/// `signature_data` is base64, optionally as a `data:<type>;base64,` URL
/// in which case the content type is taken from the URL.
#[derive(Debug, Deserialize)]
pub struct ApproveStepRequest {
    pub action: ActionKind,
    pub comments: Option<String>,
    pub signature_data: Option<String>,
    pub signature_content_type: Option<String>,
}

impl ApproveStepRequest {
    pub fn into_action_request(self) -> Result<ActionRequest, CoreError> {
        let mut request = ActionRequest::new(self.action);
        if let Some(comments) = self.comments {
            request = request.with_comments(comments);
        }
        // Signatures only matter for `signed`; anything else is ignored.
        if self.action == ActionKind::Signed {
            if let Some(raw) = self.signature_data {
                request = request.with_signature(decode_signature(
                    &raw,
                    self.signature_content_type.as_deref(),
                )?);
            }
        }
        Ok(request)
    }
}

fn decode_signature(raw: &str, content_type: Option<&str>) -> Result<SignaturePayload, CoreError> {
    if let Some(rest) = raw.trim().strip_prefix("data:") {
        let (header, encoded) = rest.split_once(',').ok_or_else(|| {
            CoreError::Validation("signature_data is not a valid data URL".into())
        })?;
        let media_type = header.strip_suffix(";base64").ok_or_else(|| {
            CoreError::Validation("signature_data URL must be base64 encoded".into())
        })?;
        return SignaturePayload::from_base64(content_type.unwrap_or(media_type), encoded);
    }
    SignaturePayload::from_base64(content_type.unwrap_or_default(), raw)
}

#[derive(Debug, Serialize)]
pub struct StepDetail {
    #[serde(flatten)]
    pub step: WorkflowStep,
    pub approvals: Vec<WorkflowApproval>,
}

/// Full view of one workflow: steps with their evidence, and attachments.
#[derive(Debug, Serialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub steps: Vec<StepDetail>,
    pub documents: Vec<WorkflowDocument>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn ensure_step_in_workflow(
    state: &AppState,
    workflow_id: DbId,
    step_id: DbId,
) -> AppResult<WorkflowStep> {
    engine::find_workflow(&state.pool, workflow_id).await?;
    StepRepo::find(&state.pool, workflow_id, step_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "WorkflowStep",
                id: step_id,
            })
        })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows
///
/// Create a workflow from an ordered list of steps. Managers and admins
/// only.
pub async fn create(
    actor: CurrentActor,
    State(state): State<AppState>,
    Json(input): Json<CreateWorkflowInput>,
) -> AppResult<impl IntoResponse> {
    if !actor.can_manage() {
        return Err(AppError::Core(CoreError::Forbidden(
            "Only managers may create workflows".into(),
        )));
    }
    let created = engine::create(&state.pool, &actor.0, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// GET /api/v1/workflows
pub async fn list(
    _actor: CurrentActor,
    State(state): State<AppState>,
    Query(filter): Query<WorkflowFilter>,
) -> AppResult<Json<DataResponse<Vec<WorkflowWithSteps>>>> {
    if let Some(status) = &filter.status {
        WorkflowStatus::from_str_value(status)?;
    }
    let workflows = WorkflowRepo::list(&state.pool, &filter).await?;
    let data = engine::with_steps(&state.pool, workflows).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/workflows/my-workflows
///
/// Open workflows with a step routed to the caller.
pub async fn my_workflows(
    actor: CurrentActor,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<WorkflowWithSteps>>>> {
    let workflows =
        WorkflowRepo::list_for_actor(&state.pool, actor.0.user_id, actor.0.department_id).await?;
    let data = engine::with_steps(&state.pool, workflows).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/workflows/performance-analytics?days_back=N
pub async fn performance_analytics(
    _actor: CurrentActor,
    State(state): State<AppState>,
    Query(params): Query<AnalyticsParams>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let days_back = clamp_days_back(params.days_back);
    let workflows =
        WorkflowRepo::list_created_since(&state.pool, now - chrono::Duration::days(days_back))
            .await?;
    let snapshots = engine::load_snapshots(&state.pool, &workflows).await?;
    let report = analyze_performance(&snapshots, now, days_back);
    Ok(Json(DataResponse { data: report }))
}

/// GET /api/v1/workflows/performance-monitoring
///
/// Open workflows, overdue first.
pub async fn performance_monitoring(
    _actor: CurrentActor,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let workflows = WorkflowRepo::list_open(&state.pool).await?;
    let snapshots = engine::load_snapshots(&state.pool, &workflows).await?;
    let entries = monitor(&snapshots, Utc::now());
    Ok(Json(DataResponse { data: entries }))
}

/// GET /api/v1/workflows/{id}
pub async fn get_by_id(
    _actor: CurrentActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<WorkflowDetail>>> {
    let workflow = engine::find_workflow(&state.pool, id).await?;
    let steps = StepRepo::list_for_workflow(&state.pool, id).await?;
    let mut approvals: HashMap<DbId, Vec<WorkflowApproval>> =
        ApprovalRepo::grouped_by_step(&state.pool, id).await?;
    let documents = DocumentRepo::list_for_workflow(&state.pool, id).await?;

    let steps = steps
        .into_iter()
        .map(|step| StepDetail {
            approvals: approvals.remove(&step.id).unwrap_or_default(),
            step,
        })
        .collect();

    Ok(Json(DataResponse {
        data: WorkflowDetail {
            workflow,
            steps,
            documents,
        },
    }))
}

/// DELETE /api/v1/workflows/{id}
///
/// Only before any action has been recorded.
pub async fn delete(
    actor: CurrentActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    engine::delete(&state.pool, &actor.0, actor.can_manage(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/workflows/{id}/start
pub async fn start(
    actor: CurrentActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<WorkflowWithSteps>>> {
    let data = engine::start(&state.pool, &state.event_bus, &actor.0, actor.can_manage(), id).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/workflows/{id}/steps
pub async fn list_steps(
    _actor: CurrentActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<WorkflowStep>>>> {
    engine::find_workflow(&state.pool, id).await?;
    let steps = StepRepo::list_for_workflow(&state.pool, id).await?;
    Ok(Json(DataResponse { data: steps }))
}

/// GET /api/v1/workflows/{id}/approvals
///
/// The full evidence trail, oldest first.
pub async fn list_approvals(
    _actor: CurrentActor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<WorkflowApproval>>>> {
    engine::find_workflow(&state.pool, id).await?;
    let approvals = ApprovalRepo::list_for_workflow(&state.pool, id).await?;
    Ok(Json(DataResponse { data: approvals }))
}

/// GET /api/v1/workflows/{id}/steps/{step_id}/approvals
pub async fn list_step_approvals(
    _actor: CurrentActor,
    State(state): State<AppState>,
    Path((id, step_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<DataResponse<Vec<WorkflowApproval>>>> {
    ensure_step_in_workflow(&state, id, step_id).await?;
    let approvals = ApprovalRepo::list_for_step(&state.pool, step_id).await?;
    Ok(Json(DataResponse { data: approvals }))
}

/// POST /api/v1/workflows/{id}/steps/{step_id}/approve
///
/// Approve, reject, return or sign the current step.
pub async fn approve_step(
    actor: CurrentActor,
    State(state): State<AppState>,
    Path((id, step_id)): Path<(DbId, DbId)>,
    Json(input): Json<ApproveStepRequest>,
) -> AppResult<impl IntoResponse> {
    let request = input.into_action_request()?;
    let result = engine::act(&state.pool, &state.event_bus, &actor.0, id, step_id, &request).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: result })))
}
