//! Transactional workflow operations.
//!
//! Every mutating call runs in one transaction: lock the instance row,
//! load its steps, run the pure machine, write the approval, the step
//! changes and the instance change, commit. Racing actors serialize on the
//! row lock and the loser sees the step is no longer current.

use std::collections::HashMap;

use chrono::Utc;
use compliflow_core::directory::Actor;
use compliflow_core::error::CoreError;
use compliflow_core::types::{DbId, Timestamp};
use compliflow_core::workflow::action::ActionRequest;
use compliflow_core::workflow::definition::{
    build_definition, CreateWorkflowInput, WorkflowDefinition,
};
use compliflow_core::workflow::machine::{self, Outcome, Transition};
use compliflow_core::workflow::WorkflowSnapshot;
use compliflow_db::models::approval::{CreateApproval, WorkflowApproval};
use compliflow_db::models::workflow::{to_snapshot, Workflow, WorkflowStep};
use compliflow_db::repositories::{
    ApprovalRepo, DepartmentRepo, StepRepo, UserRepo, WorkflowRepo,
};
use compliflow_events::{EventBus, WorkflowEvent, WorkflowEventKind};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use crate::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

/// A workflow with its ordered steps.
#[derive(Debug, Serialize)]
pub struct WorkflowWithSteps {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub steps: Vec<WorkflowStep>,
}

/// Result of an accepted action.
#[derive(Debug, Serialize)]
pub struct ActionResult {
    pub outcome: Outcome,
    pub approval: WorkflowApproval,
    pub workflow: WorkflowWithSteps,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Lock the instance row and load a consistent snapshot.
async fn load_locked(
    conn: &mut PgConnection,
    workflow_id: DbId,
) -> AppResult<(Workflow, WorkflowSnapshot)> {
    let workflow = WorkflowRepo::lock_for_update(&mut *conn, workflow_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Workflow",
            id: workflow_id,
        })?;
    let steps = StepRepo::list_for_workflow_conn(&mut *conn, workflow_id).await?;
    let snapshot = checked_snapshot(&workflow, &steps)?;
    Ok((workflow, snapshot))
}

/// Convert rows to a snapshot and verify structural invariants. Violations
/// are reported, never repaired.
fn checked_snapshot(workflow: &Workflow, steps: &[WorkflowStep]) -> Result<WorkflowSnapshot, CoreError> {
    let snapshot = to_snapshot(workflow, steps)?;
    if let Err(e) = snapshot.check_invariants() {
        tracing::error!(
            workflow_id = workflow.id,
            reference_number = %workflow.reference_number,
            error = %e,
            "Workflow failed integrity check"
        );
        return Err(e);
    }
    Ok(snapshot)
}

/// Fetch a workflow or fail with `NotFound`.
pub async fn find_workflow(pool: &PgPool, workflow_id: DbId) -> AppResult<Workflow> {
    WorkflowRepo::find_by_id(pool, workflow_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Workflow",
                id: workflow_id,
            })
        })
}

/// Attach steps to a page of workflows with one batched query.
pub async fn with_steps(
    pool: &PgPool,
    workflows: Vec<Workflow>,
) -> AppResult<Vec<WorkflowWithSteps>> {
    let ids: Vec<DbId> = workflows.iter().map(|w| w.id).collect();
    let mut steps = StepRepo::list_for_workflows(pool, &ids).await?;
    Ok(workflows
        .into_iter()
        .map(|workflow| {
            let steps = steps.remove(&workflow.id).unwrap_or_default();
            WorkflowWithSteps { workflow, steps }
        })
        .collect())
}

/// Build snapshots for analytics. Rows that fail to convert are logged and
/// left out so one bad record does not hide the rest.
pub async fn load_snapshots(
    pool: &PgPool,
    workflows: &[Workflow],
) -> AppResult<Vec<WorkflowSnapshot>> {
    let ids: Vec<DbId> = workflows.iter().map(|w| w.id).collect();
    let steps: HashMap<DbId, Vec<WorkflowStep>> = StepRepo::list_for_workflows(pool, &ids).await?;

    let mut snapshots = Vec::with_capacity(workflows.len());
    for workflow in workflows {
        let rows = steps.get(&workflow.id).map(Vec::as_slice).unwrap_or_default();
        match to_snapshot(workflow, rows) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => tracing::error!(
                workflow_id = workflow.id,
                error = %e,
                "Skipping unreadable workflow in analytics"
            ),
        }
    }
    Ok(snapshots)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

fn ensure_manager_or_creator(actor: &Actor, can_manage: bool, workflow: &Workflow) -> AppResult<()> {
    if can_manage || workflow.created_by == Some(actor.user_id) {
        return Ok(());
    }
    Err(AppError::Core(CoreError::Forbidden(format!(
        "Only the creator or a manager may modify workflow {}",
        workflow.reference_number
    ))))
}

/// Validate and persist a new workflow. Everything starts `PENDING`; no
/// notification is sent until the workflow is started.
pub async fn create(
    pool: &PgPool,
    actor: &Actor,
    input: CreateWorkflowInput,
) -> AppResult<WorkflowWithSteps> {
    let definition = build_definition(input)?;
    ensure_routing_targets_exist(pool, &definition).await?;
    let (workflow, steps) = WorkflowRepo::create(pool, &definition, actor.user_id, Utc::now()).await?;

    tracing::info!(
        workflow_id = workflow.id,
        reference_number = %workflow.reference_number,
        user_id = actor.user_id,
        step_count = steps.len(),
        "Workflow created"
    );

    Ok(WorkflowWithSteps { workflow, steps })
}

/// Every step must route to an existing department and, when assigned, to
/// an active user.
async fn ensure_routing_targets_exist(
    pool: &PgPool,
    definition: &WorkflowDefinition,
) -> AppResult<()> {
    let department_ids: Vec<DbId> = definition.steps.iter().map(|s| s.department_id).collect();
    let known_departments = DepartmentRepo::existing_ids(pool, &department_ids).await?;
    if let Some(step) = definition
        .steps
        .iter()
        .find(|s| !known_departments.contains(&s.department_id))
    {
        return Err(CoreError::Validation(format!(
            "Step {}: department {} does not exist",
            step.step_order, step.department_id
        ))
        .into());
    }

    let assignee_ids: Vec<DbId> = definition.steps.iter().filter_map(|s| s.assigned_to_id).collect();
    if assignee_ids.is_empty() {
        return Ok(());
    }
    let known_users = UserRepo::active_ids(pool, &assignee_ids).await?;
    if let Some((step, user_id)) = definition
        .steps
        .iter()
        .filter_map(|s| s.assigned_to_id.map(|u| (s, u)))
        .find(|(_, u)| !known_users.contains(u))
    {
        return Err(CoreError::Validation(format!(
            "Step {}: assignee {} is not an active user",
            step.step_order, user_id
        ))
        .into());
    }
    Ok(())
}

/// Start a `PENDING` workflow and notify the first step.
pub async fn start(
    pool: &PgPool,
    bus: &EventBus,
    actor: &Actor,
    can_manage: bool,
    workflow_id: DbId,
) -> AppResult<WorkflowWithSteps> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let (workflow, snapshot) = load_locked(&mut tx, workflow_id).await?;
    ensure_manager_or_creator(actor, can_manage, &workflow)?;

    let change = machine::start(&snapshot, now)?;
    StepRepo::apply_updates(&mut tx, &change.step_updates).await?;
    let workflow = WorkflowRepo::apply_update(&mut tx, workflow_id, &change.instance, Some(now)).await?;
    let steps = StepRepo::list_for_workflow_conn(&mut tx, workflow_id).await?;

    tx.commit().await?;

    tracing::info!(
        workflow_id,
        reference_number = %workflow.reference_number,
        user_id = actor.user_id,
        "Workflow started"
    );

    if let Some(step) = change
        .activated_step_id
        .and_then(|id| steps.iter().find(|s| s.id == id))
    {
        bus.publish(
            WorkflowEvent::new(WorkflowEventKind::StepActivated, workflow.id, &workflow.reference_number)
                .with_step(step.id, step.department_id, step.assigned_to_id)
                .with_actor(actor.user_id)
                .with_payload(serde_json::json!({ "step_order": step.step_order })),
        );
    }

    Ok(WorkflowWithSteps { workflow, steps })
}

/// Apply an approval action on behalf of `actor`.
pub async fn act(
    pool: &PgPool,
    bus: &EventBus,
    actor: &Actor,
    workflow_id: DbId,
    step_id: DbId,
    request: &ActionRequest,
) -> AppResult<ActionResult> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let (_, snapshot) = load_locked(&mut tx, workflow_id).await?;
    let transition = machine::process_action(&snapshot, actor, step_id, request, now)?;

    let approval = ApprovalRepo::insert(
        &mut tx,
        &CreateApproval::from_action(workflow_id, step_id, actor.user_id, &transition.action),
    )
    .await?;
    StepRepo::apply_updates(&mut tx, &transition.change.step_updates).await?;
    let workflow = WorkflowRepo::apply_update(&mut tx, workflow_id, &transition.change.instance, None).await?;
    let steps = StepRepo::list_for_workflow_conn(&mut tx, workflow_id).await?;

    tx.commit().await?;

    tracing::info!(
        workflow_id,
        step_id,
        user_id = actor.user_id,
        action = transition.action.kind().as_str(),
        outcome = ?transition.outcome,
        "Workflow action recorded"
    );

    publish_transition(bus, &workflow, &steps, &transition, now);

    Ok(ActionResult {
        outcome: transition.outcome,
        approval,
        workflow: WorkflowWithSteps { workflow, steps },
    })
}

/// Delete a workflow that has no recorded actions.
pub async fn delete(
    pool: &PgPool,
    actor: &Actor,
    can_manage: bool,
    workflow_id: DbId,
) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let workflow = WorkflowRepo::lock_for_update(&mut tx, workflow_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Workflow",
            id: workflow_id,
        })?;
    ensure_manager_or_creator(actor, can_manage, &workflow)?;

    if ApprovalRepo::count_for_workflow(&mut tx, workflow_id).await? > 0 {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Workflow {} has recorded approvals and cannot be deleted",
            workflow.reference_number
        ))));
    }

    WorkflowRepo::delete(&mut tx, workflow_id).await?;
    tx.commit().await?;

    tracing::info!(
        workflow_id,
        reference_number = %workflow.reference_number,
        user_id = actor.user_id,
        "Workflow deleted"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

fn publish_transition(
    bus: &EventBus,
    workflow: &Workflow,
    steps: &[WorkflowStep],
    transition: &Transition,
    now: Timestamp,
) {
    let find = |id: DbId| steps.iter().find(|s| s.id == id);

    let (kind, notified) = match transition.outcome {
        Outcome::Advanced => (
            WorkflowEventKind::StepActivated,
            transition.change.activated_step_id.and_then(find),
        ),
        Outcome::Returned => (
            WorkflowEventKind::Returned,
            transition.change.activated_step_id.and_then(find),
        ),
        Outcome::Completed => (WorkflowEventKind::Completed, find(transition.step_id)),
        Outcome::Rejected => (WorkflowEventKind::Rejected, find(transition.step_id)),
    };

    let mut event = WorkflowEvent::new(kind, workflow.id, &workflow.reference_number)
        .with_actor(transition.user_id)
        .with_payload(serde_json::json!({
            "action": transition.action.kind().as_str(),
            "acting_step_id": transition.step_id,
            "comments": transition.action.comments(),
        }));
    if let Some(step) = notified {
        event = event.with_step(step.id, step.department_id, step.assigned_to_id);
    }
    event.timestamp = now;
    bus.publish(event);
}
