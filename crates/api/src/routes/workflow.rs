//! Route definitions for the `/workflows` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{document, workflow};
use crate::state::AppState;

/// Routes mounted at `/workflows`.
///
/// ```text
/// GET    /                                   -> list
/// POST   /                                   -> create
/// GET    /my-workflows                       -> my_workflows
/// GET    /performance-analytics              -> performance_analytics
/// GET    /performance-monitoring             -> performance_monitoring
/// GET    /{id}                               -> get_by_id
/// DELETE /{id}                               -> delete
/// POST   /{id}/start                         -> start
/// GET    /{id}/steps                         -> list_steps
/// GET    /{id}/approvals                     -> list_approvals
/// GET    /{id}/steps/{step_id}/approvals     -> list_step_approvals
/// POST   /{id}/steps/{step_id}/approve       -> approve_step
/// GET    /{id}/documents                     -> document::list
/// POST   /{id}/documents                     -> document::create
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(workflow::list).post(workflow::create))
        .route("/my-workflows", get(workflow::my_workflows))
        .route(
            "/performance-analytics",
            get(workflow::performance_analytics),
        )
        .route(
            "/performance-monitoring",
            get(workflow::performance_monitoring),
        )
        .route("/{id}", get(workflow::get_by_id).delete(workflow::delete))
        .route("/{id}/start", post(workflow::start))
        .route("/{id}/steps", get(workflow::list_steps))
        .route("/{id}/approvals", get(workflow::list_approvals))
        .route(
            "/{id}/steps/{step_id}/approvals",
            get(workflow::list_step_approvals),
        )
        .route(
            "/{id}/steps/{step_id}/approve",
            post(workflow::approve_step),
        )
        .route(
            "/{id}/documents",
            get(document::list).post(document::create),
        )
}
