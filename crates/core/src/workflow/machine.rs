//! Workflow state machine.
//!
//! Both entry points are pure: they read a [`WorkflowSnapshot`] and return
//! the changes to persist. The caller is responsible for holding a lock on
//! the instance while it loads the snapshot, records the approval, and
//! writes the changes back.

use serde::Serialize;

use crate::directory::Actor;
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};
use crate::workflow::action::{ActionRequest, ApprovalAction};
use crate::workflow::authorize::authorize;
use crate::workflow::{StepState, StepStatus, WorkflowSnapshot, WorkflowStatus};

/// New values for one step row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUpdate {
    pub step_id: DbId,
    pub status: StepStatus,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub prior_active_secs: i64,
}

/// New values for the instance row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceUpdate {
    pub status: WorkflowStatus,
    pub current_step_index: i32,
    pub completed_at: Option<Timestamp>,
}

/// Everything that changes when the engine moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub step_updates: Vec<StepUpdate>,
    pub instance: InstanceUpdate,
    /// Step that became `IN_PROGRESS`, whose actors should be notified.
    pub activated_step_id: Option<DbId>,
}

impl StateChange {
    /// Apply the change to an in-memory snapshot.
    pub fn apply_to(&self, snapshot: &mut WorkflowSnapshot) {
        for update in &self.step_updates {
            if let Some(step) = snapshot.steps.iter_mut().find(|s| s.id == update.step_id) {
                step.status = update.status;
                step.started_at = update.started_at;
                step.completed_at = update.completed_at;
                step.prior_active_secs = update.prior_active_secs;
            }
        }
        snapshot.instance.status = self.instance.status;
        snapshot.instance.current_step_index = self.instance.current_step_index;
        snapshot.instance.completed_at = self.instance.completed_at;
    }
}

/// How an accepted action resolved the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The next step is now active.
    Advanced,
    /// The last step was accepted.
    Completed,
    Rejected,
    /// Sent back to the revision target step.
    Returned,
}

/// The result of an accepted action: the approval to record, then the
/// state change to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub step_id: DbId,
    pub user_id: DbId,
    pub action: ApprovalAction,
    pub outcome: Outcome,
    pub change: StateChange,
}

/// Start a `PENDING` workflow: the instance and step 1 become `IN_PROGRESS`.
pub fn start(snapshot: &WorkflowSnapshot, now: Timestamp) -> Result<StateChange, CoreError> {
    let instance = &snapshot.instance;
    if instance.status.is_terminal() {
        return Err(CoreError::WorkflowClosed(format!(
            "Workflow {} is already {}",
            instance.reference_number,
            instance.status.as_str()
        )));
    }
    if instance.status != WorkflowStatus::Pending {
        return Err(CoreError::InvalidTransition(format!(
            "Workflow {} has already been started",
            instance.reference_number
        )));
    }

    let first = snapshot.step_at(1).ok_or_else(|| {
        CoreError::Internal(format!("Workflow {} has no steps", instance.id))
    })?;

    Ok(StateChange {
        step_updates: vec![activate(first, now)],
        instance: InstanceUpdate {
            status: WorkflowStatus::InProgress,
            current_step_index: 1,
            completed_at: None,
        },
        activated_step_id: Some(first.id),
    })
}

/// Apply an action on `step_id` by `actor`.
///
/// Checks run in this order: closed workflow, not started, unknown step,
/// authorization (not current / wrong actor), payload validation. On a
/// closed workflow, a step that was already decided reports
/// `InvalidTransition`; any other step reports `WorkflowClosed`.
pub fn process_action(
    snapshot: &WorkflowSnapshot,
    actor: &Actor,
    step_id: DbId,
    request: &ActionRequest,
    now: Timestamp,
) -> Result<Transition, CoreError> {
    let instance = &snapshot.instance;
    if instance.status.is_terminal() {
        // Already decided by the action that closed the workflow.
        if let Some(step) = snapshot.step(step_id).filter(|s| s.status.is_terminal()) {
            return Err(CoreError::InvalidTransition(format!(
                "Step {} is no longer current",
                step.step_order
            )));
        }
        return Err(CoreError::WorkflowClosed(format!(
            "Workflow {} is already {}",
            instance.reference_number,
            instance.status.as_str()
        )));
    }
    if instance.status != WorkflowStatus::InProgress {
        return Err(CoreError::InvalidTransition(format!(
            "Workflow {} has not been started",
            instance.reference_number
        )));
    }

    let step = snapshot.step(step_id).ok_or(CoreError::NotFound {
        entity: "WorkflowStep",
        id: step_id,
    })?;

    authorize(actor, step).into_result()?;
    if step.step_order != instance.current_step_index {
        return Err(CoreError::InvalidTransition(format!(
            "Step {} is not the current step ({})",
            step.step_order, instance.current_step_index
        )));
    }

    let action = request.validate()?;

    let (outcome, change) = match &action {
        ApprovalAction::Approved { .. } | ApprovalAction::Signed { .. } => {
            accept(snapshot, step, now)?
        }
        ApprovalAction::Rejected { .. } => reject(step, now),
        ApprovalAction::Returned { .. } => return_for_revision(snapshot, step, now),
    };

    Ok(Transition {
        step_id,
        user_id: actor.user_id,
        action,
        outcome,
        change,
    })
}

/// Active seconds of all attempts so far, the open one ending at `now`.
fn carried_secs(step: &StepState, now: Timestamp) -> i64 {
    let current = step
        .started_at
        .map(|started| (step.completed_at.unwrap_or(now) - started).num_seconds().max(0))
        .unwrap_or(0);
    step.prior_active_secs + current
}

/// Start a new attempt; a previous attempt is folded into the carried time.
fn activate(step: &StepState, now: Timestamp) -> StepUpdate {
    StepUpdate {
        step_id: step.id,
        status: StepStatus::InProgress,
        started_at: Some(now),
        completed_at: None,
        prior_active_secs: carried_secs(step, now),
    }
}

fn finish(step: &StepState, status: StepStatus, now: Timestamp) -> StepUpdate {
    StepUpdate {
        step_id: step.id,
        status,
        started_at: step.started_at,
        completed_at: Some(now),
        prior_active_secs: step.prior_active_secs,
    }
}

fn accept(
    snapshot: &WorkflowSnapshot,
    step: &StepState,
    now: Timestamp,
) -> Result<(Outcome, StateChange), CoreError> {
    let done = finish(step, StepStatus::Approved, now);

    if snapshot.is_last_step(step.step_order) {
        return Ok((
            Outcome::Completed,
            StateChange {
                step_updates: vec![done],
                instance: InstanceUpdate {
                    status: WorkflowStatus::Completed,
                    current_step_index: step.step_order,
                    completed_at: Some(now),
                },
                activated_step_id: None,
            },
        ));
    }

    let next_order = step.step_order + 1;
    let next = snapshot.step_at(next_order).ok_or_else(|| {
        CoreError::Internal(format!(
            "Workflow {} is missing step {next_order}",
            snapshot.instance.id
        ))
    })?;

    Ok((
        Outcome::Advanced,
        StateChange {
            step_updates: vec![done, activate(next, now)],
            instance: InstanceUpdate {
                status: WorkflowStatus::InProgress,
                current_step_index: next_order,
                completed_at: None,
            },
            activated_step_id: Some(next.id),
        },
    ))
}

fn reject(step: &StepState, now: Timestamp) -> (Outcome, StateChange) {
    (
        Outcome::Rejected,
        StateChange {
            step_updates: vec![finish(step, StepStatus::Rejected, now)],
            instance: InstanceUpdate {
                status: WorkflowStatus::Rejected,
                current_step_index: step.step_order,
                completed_at: Some(now),
            },
            activated_step_id: None,
        },
    )
}

/// Re-activate the revision target.
///
/// The target is clamped to the returning step. Steps strictly between the
/// target and the returning step are reset to `PENDING`; the returning step
/// keeps its `RETURNED` mark until it is reached again. Time already spent
/// on reset or re-activated steps moves into `prior_active_secs`.
fn return_for_revision(
    snapshot: &WorkflowSnapshot,
    step: &StepState,
    now: Timestamp,
) -> (Outcome, StateChange) {
    let target = snapshot
        .instance
        .revision_target_step
        .clamp(1, step.step_order);

    let mut step_updates = Vec::new();
    let mut activated_step_id = None;
    for s in snapshot
        .steps
        .iter()
        .filter(|s| s.step_order >= target && s.step_order <= step.step_order)
    {
        let update = if s.step_order == target {
            activated_step_id = Some(s.id);
            activate(s, now)
        } else if s.id == step.id {
            finish(s, StepStatus::Returned, now)
        } else {
            StepUpdate {
                step_id: s.id,
                status: StepStatus::Pending,
                started_at: None,
                completed_at: None,
                prior_active_secs: carried_secs(s, now),
            }
        };
        step_updates.push(update);
    }

    (
        Outcome::Returned,
        StateChange {
            step_updates,
            instance: InstanceUpdate {
                status: WorkflowStatus::InProgress,
                current_step_index: target,
                completed_at: None,
            },
            activated_step_id,
        },
    )
}
