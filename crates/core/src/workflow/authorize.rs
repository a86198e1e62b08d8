//! Step authorization.
//!
//! [`authorize`] is pure: it only looks at the actor and the step, so it can
//! be tested without any HTTP or database plumbing.

use serde::Serialize;

use crate::directory::Actor;
use crate::error::CoreError;
use crate::workflow::{StepState, StepStatus};

/// Why an actor may not act on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The step is not the active step of its workflow.
    NotCurrentStep,
    /// The step is routed to someone else.
    WrongActor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Authorized,
    Denied(DenyReason),
}

impl Decision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized)
    }

    /// Convert a denial into the error the API surfaces.
    pub fn into_result(self) -> Result<(), CoreError> {
        match self {
            Self::Authorized => Ok(()),
            Self::Denied(DenyReason::NotCurrentStep) => Err(CoreError::InvalidTransition(
                "Step is not the current step of this workflow".into(),
            )),
            Self::Denied(DenyReason::WrongActor) => Err(CoreError::Forbidden(
                "Step is not assigned to you or your department".into(),
            )),
        }
    }
}

/// Decide whether `actor` may act on `step` now.
///
/// A specific assignee excludes the rest of the department.
pub fn authorize(actor: &Actor, step: &StepState) -> Decision {
    if step.status != StepStatus::InProgress {
        return Decision::Denied(DenyReason::NotCurrentStep);
    }

    if is_routed_to(actor, step) {
        Decision::Authorized
    } else {
        Decision::Denied(DenyReason::WrongActor)
    }
}

/// Whether the step is routed to `actor` at all, regardless of its status.
///
/// Used to build the "my workflows" list.
pub fn is_routed_to(actor: &Actor, step: &StepState) -> bool {
    match step.assigned_to_id {
        Some(assignee) => assignee == actor.user_id,
        None => actor.department_id == Some(step.department_id),
    }
}
