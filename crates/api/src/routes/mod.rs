pub mod health;
pub mod workflow;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /workflows                                       list, create
/// /workflows/my-workflows                          caller's open work
/// /workflows/performance-analytics                 duration and bottleneck report
/// /workflows/performance-monitoring                open workflows, overdue first
/// /workflows/{id}                                  detail, delete
/// /workflows/{id}/start                            start (POST)
/// /workflows/{id}/steps                            steps
/// /workflows/{id}/approvals                        evidence trail
/// /workflows/{id}/steps/{step_id}/approvals        step evidence
/// /workflows/{id}/steps/{step_id}/approve          act (POST)
/// /workflows/{id}/documents                        list, attach
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/workflows", workflow::router())
}
