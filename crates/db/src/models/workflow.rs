//! Workflow instance and step models.

use compliflow_core::error::CoreError;
use compliflow_core::types::{DbId, Timestamp};
use compliflow_core::workflow::{
    ActionRequired, InstanceState, StepState, StepStatus, WorkflowSnapshot, WorkflowStatus,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `workflows` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Workflow {
    pub id: DbId,
    pub reference_number: String,
    pub name: String,
    pub description: Option<String>,
    pub linked_audit_id: Option<DbId>,
    pub status: String,
    pub current_step_index: i32,
    pub revision_target_step: i32,
    pub created_by: Option<DbId>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `workflow_steps` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowStep {
    pub id: DbId,
    pub workflow_id: DbId,
    pub step_order: i32,
    pub department_id: DbId,
    pub assigned_to_id: Option<DbId>,
    pub action_required: String,
    pub instructions: Option<String>,
    pub due_date: Option<Timestamp>,
    pub status: String,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub prior_active_secs: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Query filter for listing workflows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowFilter {
    pub status: Option<String>,
    pub department_id: Option<DbId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Stored values that fail to parse mean the row was written outside the
/// engine.
fn corrupt(entity: &str, id: DbId, err: CoreError) -> CoreError {
    CoreError::Internal(format!("{entity} {id} holds an invalid value: {err}"))
}

impl Workflow {
    pub fn to_state(&self) -> Result<InstanceState, CoreError> {
        Ok(InstanceState {
            id: self.id,
            reference_number: self.reference_number.clone(),
            name: self.name.clone(),
            status: WorkflowStatus::from_str_value(&self.status)
                .map_err(|e| corrupt("Workflow", self.id, e))?,
            current_step_index: self.current_step_index,
            revision_target_step: self.revision_target_step,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

impl WorkflowStep {
    pub fn to_state(&self) -> Result<StepState, CoreError> {
        Ok(StepState {
            id: self.id,
            step_order: self.step_order,
            department_id: self.department_id,
            assigned_to_id: self.assigned_to_id,
            action_required: ActionRequired::from_str_value(&self.action_required)
                .map_err(|e| corrupt("WorkflowStep", self.id, e))?,
            due_date: self.due_date,
            status: StepStatus::from_str_value(&self.status)
                .map_err(|e| corrupt("WorkflowStep", self.id, e))?,
            started_at: self.started_at,
            completed_at: self.completed_at,
            prior_active_secs: self.prior_active_secs,
        })
    }
}

/// Build the engine snapshot from rows. `steps` must belong to `workflow`
/// and be ordered by `step_order`.
pub fn to_snapshot(
    workflow: &Workflow,
    steps: &[WorkflowStep],
) -> Result<WorkflowSnapshot, CoreError> {
    Ok(WorkflowSnapshot {
        instance: workflow.to_state()?,
        steps: steps
            .iter()
            .map(WorkflowStep::to_state)
            .collect::<Result<Vec<_>, _>>()?,
    })
}
