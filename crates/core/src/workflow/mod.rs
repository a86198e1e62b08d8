//! Multi-step approval workflow engine.
//!
//! - [`definition`] -- validates caller input into a numbered step list and
//!   formats reference numbers.
//! - [`authorize`] -- decides whether an actor may act on a step.
//! - [`action`] -- action requests, signature payloads, and the typed
//!   approval record.
//! - [`machine`] -- the start/act state machine.
//! - [`analytics`] -- duration statistics, bottlenecks, and overdue checks.
//!
//! Status values are stored as upper-case text in the database and parsed
//! back with the `from_str_value` helpers.

pub mod action;
pub mod analytics;
pub mod authorize;
pub mod definition;
pub mod machine;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    /// Kept for records imported from the legacy system; the engine itself
    /// resolves accepted workflows to `Completed`.
    Approved,
    Rejected,
    Completed,
}

pub const VALID_WORKFLOW_STATUSES: &[&str] =
    &["PENDING", "IN_PROGRESS", "APPROVED", "REJECTED", "COMPLETED"];

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(CoreError::Validation(format!(
                "Invalid workflow status '{s}'. Must be one of: {}",
                VALID_WORKFLOW_STATUSES.join(", ")
            ))),
        }
    }

    /// No further step can ever become active.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Completed)
    }
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    /// The step sent the workflow back for revision and waits to be
    /// re-activated once the earlier steps are accepted again.
    Returned,
}

pub const VALID_STEP_STATUSES: &[&str] =
    &["PENDING", "IN_PROGRESS", "APPROVED", "REJECTED", "RETURNED"];

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Returned => "RETURNED",
        }
    }

    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "RETURNED" => Ok(Self::Returned),
            _ => Err(CoreError::Validation(format!(
                "Invalid step status '{s}'. Must be one of: {}",
                VALID_STEP_STATUSES.join(", ")
            ))),
        }
    }

    /// A step that has been decided and will not be acted on again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// A step that lies ahead of the current one.
    pub fn is_awaiting(&self) -> bool {
        matches!(self, Self::Pending | Self::Returned)
    }
}

/// What the routed actor is expected to do at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionRequired {
    ReviewAndApprove,
    Sign,
    Review,
    Acknowledge,
    CreateDocument,
    AddMinutes,
    Custom,
}

pub const VALID_ACTIONS_REQUIRED: &[&str] = &[
    "REVIEW_AND_APPROVE",
    "SIGN",
    "REVIEW",
    "ACKNOWLEDGE",
    "CREATE_DOCUMENT",
    "ADD_MINUTES",
    "CUSTOM",
];

impl ActionRequired {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReviewAndApprove => "REVIEW_AND_APPROVE",
            Self::Sign => "SIGN",
            Self::Review => "REVIEW",
            Self::Acknowledge => "ACKNOWLEDGE",
            Self::CreateDocument => "CREATE_DOCUMENT",
            Self::AddMinutes => "ADD_MINUTES",
            Self::Custom => "CUSTOM",
        }
    }

    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            "REVIEW_AND_APPROVE" => Ok(Self::ReviewAndApprove),
            "SIGN" => Ok(Self::Sign),
            "REVIEW" => Ok(Self::Review),
            "ACKNOWLEDGE" => Ok(Self::Acknowledge),
            "CREATE_DOCUMENT" => Ok(Self::CreateDocument),
            "ADD_MINUTES" => Ok(Self::AddMinutes),
            "CUSTOM" => Ok(Self::Custom),
            _ => Err(CoreError::Validation(format!(
                "Invalid action_required '{s}'. Must be one of: {}",
                VALID_ACTIONS_REQUIRED.join(", ")
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Engine view of a workflow instance row.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceState {
    pub id: DbId,
    pub reference_number: String,
    pub name: String,
    pub status: WorkflowStatus,
    pub current_step_index: i32,
    pub revision_target_step: i32,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Engine view of a workflow step row.
#[derive(Debug, Clone, PartialEq)]
pub struct StepState {
    pub id: DbId,
    pub step_order: i32,
    pub department_id: DbId,
    pub assigned_to_id: Option<DbId>,
    pub action_required: ActionRequired,
    pub due_date: Option<Timestamp>,
    pub status: StepStatus,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// Active seconds from earlier attempts closed by a return for revision.
    pub prior_active_secs: i64,
}

/// An instance together with its steps, ordered by `step_order`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSnapshot {
    pub instance: InstanceState,
    pub steps: Vec<StepState>,
}

impl WorkflowSnapshot {
    pub fn step(&self, step_id: DbId) -> Option<&StepState> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_at(&self, step_order: i32) -> Option<&StepState> {
        self.steps.iter().find(|s| s.step_order == step_order)
    }

    /// The step at `current_step_index`, if the instance is running.
    pub fn current_step(&self) -> Option<&StepState> {
        if self.instance.status != WorkflowStatus::InProgress {
            return None;
        }
        self.step_at(self.instance.current_step_index)
    }

    pub fn is_last_step(&self, step_order: i32) -> bool {
        step_order as usize == self.steps.len()
    }

    /// Verify step numbering and the single-active-step rule.
    ///
    /// A failure here means the stored data is corrupt, not that the caller
    /// did something wrong. Callers must log it and must not repair it.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        let id = self.instance.id;

        for (idx, step) in self.steps.iter().enumerate() {
            let expected = idx as i32 + 1;
            if step.step_order != expected {
                return Err(integrity(
                    id,
                    format!(
                        "non-contiguous step_order: expected {expected}, found {}",
                        step.step_order
                    ),
                ));
            }
        }

        let active: Vec<i32> = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::InProgress)
            .map(|s| s.step_order)
            .collect();
        if active.len() > 1 {
            return Err(integrity(
                id,
                format!("multiple steps IN_PROGRESS: {active:?}"),
            ));
        }

        match self.instance.status {
            WorkflowStatus::Pending => {
                if let Some(step) = self.steps.iter().find(|s| s.status != StepStatus::Pending) {
                    return Err(integrity(
                        id,
                        format!(
                            "instance PENDING but step {} is {}",
                            step.step_order,
                            step.status.as_str()
                        ),
                    ));
                }
            }
            WorkflowStatus::InProgress => {
                let current = self.instance.current_step_index;
                if active.first() != Some(&current) {
                    return Err(integrity(
                        id,
                        format!("current_step_index {current} does not match active step {active:?}"),
                    ));
                }
                for step in &self.steps {
                    let ok = if step.step_order < current {
                        step.status.is_terminal()
                    } else if step.step_order > current {
                        step.status.is_awaiting()
                    } else {
                        true
                    };
                    if !ok {
                        return Err(integrity(
                            id,
                            format!(
                                "step {} is {} relative to current step {current}",
                                step.step_order,
                                step.status.as_str()
                            ),
                        ));
                    }
                }
            }
            WorkflowStatus::Completed => {
                if let Some(step) = self.steps.iter().find(|s| s.status != StepStatus::Approved) {
                    return Err(integrity(
                        id,
                        format!(
                            "instance COMPLETED but step {} is {}",
                            step.step_order,
                            step.status.as_str()
                        ),
                    ));
                }
            }
            WorkflowStatus::Approved | WorkflowStatus::Rejected => {
                if !active.is_empty() {
                    return Err(integrity(
                        id,
                        format!("terminal instance has active step {active:?}"),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn integrity(workflow_id: DbId, detail: String) -> CoreError {
    CoreError::Internal(format!(
        "Data integrity violation in workflow {workflow_id}: {detail}"
    ))
}
