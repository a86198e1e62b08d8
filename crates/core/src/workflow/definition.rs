//! Workflow definition validation and reference-number formatting.
//!
//! The builder turns caller input into a [`WorkflowDefinition`] whose steps
//! are numbered 1..=N in input order. Persistence and reference-number
//! allocation happen in the `db` crate.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};
use crate::workflow::ActionRequired;

/// Upper bound on steps per workflow.
pub const MAX_STEPS: usize = 50;

/// Maximum length of a workflow name.
pub const MAX_NAME_LENGTH: usize = 255;

/// Prefix for all workflow reference numbers.
pub const REFERENCE_PREFIX: &str = "WF";

/// Input for one step, as submitted by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    pub department_id: Option<DbId>,
    pub assigned_to_id: Option<DbId>,
    pub action_required: ActionRequired,
    pub due_date: Option<Timestamp>,
    pub instructions: Option<String>,
}

/// Input for creating a workflow instance.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowInput {
    pub name: String,
    pub description: Option<String>,
    pub linked_audit_id: Option<DbId>,
    /// Step re-activated when a step returns the workflow for revision.
    /// Defaults to 1 (full restart).
    pub revision_target_step: Option<i32>,
    pub steps: Vec<StepSpec>,
}

/// A validated, numbered step ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDefinition {
    pub step_order: i32,
    pub department_id: DbId,
    pub assigned_to_id: Option<DbId>,
    pub action_required: ActionRequired,
    pub due_date: Option<Timestamp>,
    pub instructions: Option<String>,
}

/// A validated workflow ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: Option<String>,
    pub linked_audit_id: Option<DbId>,
    pub revision_target_step: i32,
    pub steps: Vec<StepDefinition>,
}

/// Validate caller input and number its steps.
pub fn build_definition(input: CreateWorkflowInput) -> Result<WorkflowDefinition, CoreError> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(CoreError::Validation("Workflow name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Workflow name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    if input.steps.is_empty() {
        return Err(CoreError::Validation(
            "A workflow requires at least one step".into(),
        ));
    }
    if input.steps.len() > MAX_STEPS {
        return Err(CoreError::Validation(format!(
            "A workflow may have at most {MAX_STEPS} steps"
        )));
    }

    let steps = input
        .steps
        .into_iter()
        .enumerate()
        .map(|(idx, spec)| build_step(idx as i32 + 1, spec))
        .collect::<Result<Vec<_>, _>>()?;

    let revision_target_step = input.revision_target_step.unwrap_or(1);
    if revision_target_step < 1 || revision_target_step as usize > steps.len() {
        return Err(CoreError::Validation(format!(
            "revision_target_step must be between 1 and {}",
            steps.len()
        )));
    }

    Ok(WorkflowDefinition {
        name,
        description: normalize_text(input.description),
        linked_audit_id: input.linked_audit_id,
        revision_target_step,
        steps,
    })
}

fn build_step(step_order: i32, spec: StepSpec) -> Result<StepDefinition, CoreError> {
    let department_id = spec.department_id.ok_or_else(|| {
        CoreError::Validation(format!("Step {step_order}: department_id is required"))
    })?;

    let instructions = normalize_text(spec.instructions);
    if spec.action_required == ActionRequired::Custom && instructions.is_none() {
        return Err(CoreError::Validation(format!(
            "Step {step_order}: CUSTOM actions require instructions"
        )));
    }

    Ok(StepDefinition {
        step_order,
        department_id,
        assigned_to_id: spec.assigned_to_id,
        action_required: spec.action_required,
        due_date: spec.due_date,
        instructions,
    })
}

/// Trim free text and collapse blank values to `None`.
fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Format a reference number, e.g. `WF-2025-00042`.
///
/// Sequences beyond five digits widen rather than wrap.
pub fn format_reference_number(year: i32, sequence: i64) -> String {
    format!("{REFERENCE_PREFIX}-{year}-{sequence:05}")
}
