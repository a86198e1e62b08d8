//! HTTP-level integration tests for the workflow engine.
//!
//! Scenarios run end to end against a real database: creation, start,
//! approve/sign/reject/return, the approval race, deletion rules, the
//! evidence trail, notifications, and the analytics views.

mod common;

use axum::body::Body;
use axum::http::{Response, StatusCode};
use chrono::{Datelike, Duration, Utc};
use common::{
    body_json, create_department, create_user, delete_auth, get_auth, post_auth, post_json_auth,
    token_for,
};
use compliflow_events::WorkflowEventKind;
use serde_json::{json, Value};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Fixture {
    quality_id: i64,
    legal_id: i64,
    manager: String,
    quality_member: String,
    quality_member_2: String,
    legal_member: String,
}

async fn seed(pool: &PgPool) -> Fixture {
    let quality = create_department(pool, "Quality").await;
    let legal = create_department(pool, "Legal").await;
    let manager = create_user(pool, "manager", quality.id, "manager").await;
    let q1 = create_user(pool, "q.reviewer", quality.id, "member").await;
    let q2 = create_user(pool, "q.reviewer2", quality.id, "member").await;
    let l1 = create_user(pool, "l.signer", legal.id, "member").await;

    Fixture {
        quality_id: quality.id,
        legal_id: legal.id,
        manager: token_for(manager.id, "manager"),
        quality_member: token_for(q1.id, "member"),
        quality_member_2: token_for(q2.id, "member"),
        legal_member: token_for(l1.id, "member"),
    }
}

fn two_step_body(fx: &Fixture) -> Value {
    json!({
        "name": "Supplier audit sign-off",
        "linked_audit_id": 17,
        "steps": [
            { "department_id": fx.quality_id, "action_required": "REVIEW_AND_APPROVE" },
            { "department_id": fx.legal_id, "action_required": "SIGN" }
        ]
    })
}

/// Create and start a two-step workflow, returning `(id, step1_id, step2_id)`.
async fn started_workflow(app: &axum::Router, fx: &Fixture) -> (i64, i64, i64) {
    let response = post_json_auth(app.clone(), "/api/v1/workflows", &fx.manager, two_step_body(fx)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let id = json["data"]["id"].as_i64().unwrap();
    let step1 = json["data"]["steps"][0]["id"].as_i64().unwrap();
    let step2 = json["data"]["steps"][1]["id"].as_i64().unwrap();

    let response = post_auth(app.clone(), &format!("/api/v1/workflows/{id}/start"), &fx.manager).await;
    assert_eq!(response.status(), StatusCode::OK);
    (id, step1, step2)
}

fn approve_uri(id: i64, step_id: i64) -> String {
    format!("/api/v1/workflows/{id}/steps/{step_id}/approve")
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_assigns_reference_and_pending_steps(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);

    let response = post_json_auth(app, "/api/v1/workflows", &fx.manager, two_step_body(&fx)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    let data = &json["data"];
    let expected_ref = format!("WF-{}-00001", Utc::now().year());
    assert_eq!(data["reference_number"], expected_ref.as_str());
    assert_eq!(data["status"], "PENDING");
    assert_eq!(data["current_step_index"], 1);
    assert_eq!(data["steps"][0]["step_order"], 1);
    assert_eq!(data["steps"][1]["step_order"], 2);
    assert_eq!(data["steps"][0]["status"], "PENDING");
    assert_eq!(data["steps"][1]["status"], "PENDING");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_rejects_invalid_definitions(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);

    let no_steps = json!({ "name": "Empty", "steps": [] });
    let response = post_json_auth(app.clone(), "/api/v1/workflows", &fx.manager, no_steps).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let custom_without_instructions = json!({
        "name": "Custom",
        "steps": [{ "department_id": fx.quality_id, "action_required": "CUSTOM" }]
    });
    let response = post_json_auth(
        app.clone(),
        "/api/v1/workflows",
        &fx.manager,
        custom_without_instructions,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unknown_department = json!({
        "name": "Misrouted",
        "steps": [
            { "department_id": fx.quality_id, "action_required": "REVIEW" },
            { "department_id": fx.legal_id + 1000, "action_required": "SIGN" }
        ]
    });
    let response =
        post_json_auth(app.clone(), "/api/v1/workflows", &fx.manager, unknown_department).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("Step 2"));

    let unknown_assignee = json!({
        "name": "Misassigned",
        "steps": [{ "department_id": fx.quality_id, "assigned_to_id": 987_654, "action_required": "REVIEW" }]
    });
    let response =
        post_json_auth(app.clone(), "/api/v1/workflows", &fx.manager, unknown_assignee).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let response =
        post_json_auth(app, "/api/v1/workflows", &fx.quality_member, two_step_body(&fx)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn two_step_workflow_runs_to_completion(pool: PgPool) {
    let fx = seed(&pool).await;
    let (app, bus) = common::build_test_app_with_bus(pool);
    let mut events = bus.subscribe();

    let (id, step1, step2) = started_workflow(&app, &fx).await;
    let activated = events.recv().await.unwrap();
    assert_eq!(activated.kind, WorkflowEventKind::StepActivated);
    assert_eq!(activated.step_id, Some(step1));
    assert_eq!(activated.department_id, Some(fx.quality_id));

    let response = post_json_auth(
        app.clone(),
        &approve_uri(id, step1),
        &fx.quality_member,
        json!({ "action": "approved", "comments": "Evidence complete" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["outcome"], "ADVANCED");
    assert_eq!(json["data"]["workflow"]["current_step_index"], 2);
    assert_eq!(json["data"]["workflow"]["steps"][0]["status"], "APPROVED");
    assert_eq!(json["data"]["workflow"]["steps"][1]["status"], "IN_PROGRESS");

    let next = events.recv().await.unwrap();
    assert_eq!(next.kind, WorkflowEventKind::StepActivated);
    assert_eq!(next.step_id, Some(step2));
    assert_eq!(next.department_id, Some(fx.legal_id));

    let response = post_json_auth(
        app.clone(),
        &approve_uri(id, step2),
        &fx.legal_member,
        json!({ "action": "signed", "signature_data": "data:image/png;base64,iVBORw0KGgo=" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["outcome"], "COMPLETED");
    assert_eq!(json["data"]["workflow"]["status"], "COMPLETED");
    assert!(json["data"]["workflow"]["completed_at"].is_string());
    assert_eq!(json["data"]["approval"]["signature_content_type"], "image/png");
    assert!(json["data"]["approval"].get("signature_data").is_none());

    assert_eq!(events.recv().await.unwrap().kind, WorkflowEventKind::Completed);

    // Evidence trail: one row per action, in order.
    let response = get_auth(app.clone(), &format!("/api/v1/workflows/{id}/approvals"), &fx.manager).await;
    let trail = body_json(response).await;
    let rows = trail["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["action"], "approved");
    assert_eq!(rows[0]["comments"], "Evidence complete");
    assert_eq!(rows[1]["action"], "signed");
    assert_eq!(rows[1]["signature_sha256"].as_str().unwrap().len(), 64);

    // Detail groups approvals under their steps.
    let response = get_auth(app.clone(), &format!("/api/v1/workflows/{id}"), &fx.manager).await;
    let detail = body_json(response).await;
    assert_eq!(detail["data"]["steps"][0]["approvals"].as_array().unwrap().len(), 1);
    assert_eq!(detail["data"]["steps"][1]["approvals"][0]["action"], "signed");

    // The decided step is no longer current.
    let response = post_json_auth(
        app,
        &approve_uri(id, step2),
        &fx.legal_member,
        json!({ "action": "approved" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "INVALID_TRANSITION");
}

// ---------------------------------------------------------------------------
// Rejections and validation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn acting_before_start_is_invalid_transition(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);

    let response = post_json_auth(app.clone(), "/api/v1/workflows", &fx.manager, two_step_body(&fx)).await;
    let json = body_json(response).await;
    let id = json["data"]["id"].as_i64().unwrap();
    let step1 = json["data"]["steps"][0]["id"].as_i64().unwrap();

    let response = post_json_auth(
        app,
        &approve_uri(id, step1),
        &fx.quality_member,
        json!({ "action": "approved" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "INVALID_TRANSITION");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn wrong_department_is_forbidden(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);
    let (id, step1, _) = started_workflow(&app, &fx).await;

    let response = post_json_auth(
        app,
        &approve_uri(id, step1),
        &fx.legal_member,
        json!({ "action": "approved" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn acting_on_a_later_step_is_invalid_transition(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);
    let (id, _, step2) = started_workflow(&app, &fx).await;

    let response = post_json_auth(
        app,
        &approve_uri(id, step2),
        &fx.legal_member,
        json!({ "action": "approved" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "INVALID_TRANSITION");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn reject_closes_the_workflow(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);
    let (id, step1, step2) = started_workflow(&app, &fx).await;

    let response = post_json_auth(
        app.clone(),
        &approve_uri(id, step1),
        &fx.quality_member,
        json!({ "action": "rejected", "comments": "Missing calibration records" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["outcome"], "REJECTED");
    assert_eq!(json["data"]["workflow"]["status"], "REJECTED");
    assert_eq!(json["data"]["workflow"]["steps"][0]["status"], "REJECTED");
    assert_eq!(json["data"]["workflow"]["steps"][1]["status"], "PENDING");

    let response = post_json_auth(
        app,
        &approve_uri(id, step2),
        &fx.legal_member,
        json!({ "action": "approved" }),
    )
    .await;
    assert_eq!(body_json(response).await["code"], "WORKFLOW_CLOSED");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn empty_signature_is_rejected_without_side_effects(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);
    let (id, step1, step2) = started_workflow(&app, &fx).await;

    post_json_auth(
        app.clone(),
        &approve_uri(id, step1),
        &fx.quality_member,
        json!({ "action": "approved" }),
    )
    .await;

    let response = post_json_auth(
        app.clone(),
        &approve_uri(id, step2),
        &fx.legal_member,
        json!({ "action": "signed", "signature_data": "", "signature_content_type": "image/png" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let response = get_auth(
        app.clone(),
        &format!("/api/v1/workflows/{id}/steps/{step2}/approvals"),
        &fx.manager,
    )
    .await;
    assert!(body_json(response).await["data"].as_array().unwrap().is_empty());

    let response = get_auth(app, &format!("/api/v1/workflows/{id}/steps"), &fx.manager).await;
    let steps = body_json(response).await;
    assert_eq!(steps["data"][1]["status"], "IN_PROGRESS");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn return_reactivates_first_step(pool: PgPool) {
    let fx = seed(&pool).await;
    let (app, bus) = common::build_test_app_with_bus(pool);
    let (id, step1, step2) = started_workflow(&app, &fx).await;

    post_json_auth(
        app.clone(),
        &approve_uri(id, step1),
        &fx.quality_member,
        json!({ "action": "approved" }),
    )
    .await;

    let response = post_json_auth(
        app.clone(),
        &approve_uri(id, step2),
        &fx.legal_member,
        json!({ "action": "returned" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut events = bus.subscribe();
    let response = post_json_auth(
        app,
        &approve_uri(id, step2),
        &fx.legal_member,
        json!({ "action": "returned", "comments": "Attach the signed NDA" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let workflow = &json["data"]["workflow"];
    assert_eq!(json["data"]["outcome"], "RETURNED");
    assert_eq!(workflow["status"], "IN_PROGRESS");
    assert_eq!(workflow["current_step_index"], 1);
    assert_eq!(workflow["steps"][0]["status"], "IN_PROGRESS");
    assert_eq!(workflow["steps"][1]["status"], "RETURNED");

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, WorkflowEventKind::Returned);
    assert_eq!(event.step_id, Some(step1));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_approvals_record_exactly_one(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);
    let (id, step1, _) = started_workflow(&app, &fx).await;
    let uri = approve_uri(id, step1);

    let (a, b) = tokio::join!(
        post_json_auth(app.clone(), &uri, &fx.quality_member, json!({ "action": "approved" })),
        post_json_auth(app.clone(), &uri, &fx.quality_member_2, json!({ "action": "approved" })),
    );

    assert_one_winner(a, b).await;

    let response = get_auth(app, &format!("/api/v1/workflows/{id}/approvals"), &fx.manager).await;
    assert_eq!(body_json(response).await["data"].as_array().unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_approvals_on_final_step_record_exactly_one(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);

    let body = json!({
        "name": "Single sign-off",
        "steps": [{ "department_id": fx.quality_id, "action_required": "REVIEW_AND_APPROVE" }]
    });
    let response = post_json_auth(app.clone(), "/api/v1/workflows", &fx.manager, body).await;
    let json = body_json(response).await;
    let id = json["data"]["id"].as_i64().unwrap();
    let step = json["data"]["steps"][0]["id"].as_i64().unwrap();
    post_auth(app.clone(), &format!("/api/v1/workflows/{id}/start"), &fx.manager).await;

    let uri = approve_uri(id, step);
    let (a, b) = tokio::join!(
        post_json_auth(app.clone(), &uri, &fx.quality_member, json!({ "action": "approved" })),
        post_json_auth(app.clone(), &uri, &fx.quality_member_2, json!({ "action": "approved" })),
    );
    assert_one_winner(a, b).await;

    let response = get_auth(app.clone(), &format!("/api/v1/workflows/{id}"), &fx.manager).await;
    let detail = body_json(response).await;
    assert_eq!(detail["data"]["status"], "COMPLETED");
    assert_eq!(detail["data"]["steps"][0]["approvals"].as_array().unwrap().len(), 1);
}

/// One response is 201; the other is a 409 reporting the step is no
/// longer current.
async fn assert_one_winner(a: Response<Body>, b: Response<Body>) {
    let (winner, loser) = if a.status() == StatusCode::CREATED { (a, b) } else { (b, a) };
    assert_eq!(winner.status(), StatusCode::CREATED);
    assert_eq!(loser.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(loser).await["code"], "INVALID_TRANSITION");
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_is_refused_once_evidence_exists(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);
    let (id, step1, _) = started_workflow(&app, &fx).await;

    let response = delete_auth(app.clone(), &format!("/api/v1/workflows/{id}"), &fx.quality_member).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    post_json_auth(
        app.clone(),
        &approve_uri(id, step1),
        &fx.quality_member,
        json!({ "action": "approved" }),
    )
    .await;

    let response = delete_auth(app.clone(), &format!("/api/v1/workflows/{id}"), &fx.manager).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = post_json_auth(app.clone(), "/api/v1/workflows", &fx.manager, two_step_body(&fx)).await;
    let fresh = body_json(response).await["data"]["id"].as_i64().unwrap();
    let response = delete_auth(app.clone(), &format!("/api/v1/workflows/{fresh}"), &fx.manager).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get_auth(app, &format!("/api/v1/workflows/{fresh}"), &fx.manager).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Listing, documents, analytics
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn my_workflows_follow_routing(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);
    let (id, step1, _) = started_workflow(&app, &fx).await;

    let response = get_auth(app.clone(), "/api/v1/workflows/my-workflows", &fx.legal_member).await;
    let legal = body_json(response).await;
    assert_eq!(legal["data"][0]["id"], id);

    post_json_auth(
        app.clone(),
        &approve_uri(id, step1),
        &fx.quality_member,
        json!({ "action": "approved" }),
    )
    .await;

    let response = get_auth(app.clone(), "/api/v1/workflows/my-workflows", &fx.quality_member).await;
    assert!(body_json(response).await["data"].as_array().unwrap().is_empty());

    let response = get_auth(app.clone(), "/api/v1/workflows?status=IN_PROGRESS", &fx.manager).await;
    assert_eq!(body_json(response).await["data"].as_array().unwrap().len(), 1);

    let response = get_auth(app, "/api/v1/workflows?status=DONE", &fx.manager).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn documents_attach_to_workflow(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);
    let (id, _, _) = started_workflow(&app, &fx).await;
    let uri = format!("/api/v1/workflows/{id}/documents");

    let response = post_json_auth(
        app.clone(),
        &uri,
        &fx.quality_member,
        json!({ "name": "calibration.pdf", "storage_key": "audits/17/calibration.pdf" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = post_json_auth(app.clone(), &uri, &fx.quality_member, json!({ "name": "", "storage_key": "x" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get_auth(app, &uri, &fx.manager).await;
    let docs = body_json(response).await;
    assert_eq!(docs["data"][0]["name"], "calibration.pdf");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn analytics_and_monitoring(pool: PgPool) {
    let fx = seed(&pool).await;
    let app = common::build_test_app(pool);

    // One completed workflow.
    let (id, step1, step2) = started_workflow(&app, &fx).await;
    post_json_auth(app.clone(), &approve_uri(id, step1), &fx.quality_member, json!({ "action": "approved" })).await;
    post_json_auth(
        app.clone(),
        &approve_uri(id, step2),
        &fx.legal_member,
        json!({ "action": "signed", "signature_data": "aGVsbG8=", "signature_content_type": "image/png" }),
    )
    .await;

    // One running workflow whose first step is past due.
    let overdue_body = json!({
        "name": "Overdue CAPA review",
        "steps": [{
            "department_id": fx.quality_id,
            "action_required": "REVIEW",
            "due_date": (Utc::now() - Duration::days(2)).to_rfc3339()
        }]
    });
    let response = post_json_auth(app.clone(), "/api/v1/workflows", &fx.manager, overdue_body).await;
    let overdue_id = body_json(response).await["data"]["id"].as_i64().unwrap();
    post_auth(app.clone(), &format!("/api/v1/workflows/{overdue_id}/start"), &fx.manager).await;

    let response = get_auth(
        app.clone(),
        "/api/v1/workflows/performance-analytics?days_back=9999",
        &fx.manager,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["data"]["days_back"], 365);
    assert_eq!(report["data"]["total_workflows"], 2);
    assert_eq!(report["data"]["completed_workflows"], 1);
    assert_eq!(report["data"]["in_progress_workflows"], 1);
    assert_eq!(report["data"]["overdue_workflows"], 1);
    assert_eq!(report["data"]["completion_rate"], 0.5);

    let response = get_auth(app, "/api/v1/workflows/performance-monitoring", &fx.manager).await;
    let entries = body_json(response).await;
    let entries = entries["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["workflow_id"], overdue_id);
    assert_eq!(entries[0]["is_overdue"], true);
    assert!(entries[0]["hours_overdue"].as_f64().unwrap() >= 47.0);
}
