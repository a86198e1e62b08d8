//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! Shared as `Arc<EventBus>` through the API state. Publishing never blocks
//! and never fails the caller.

use chrono::{DateTime, Utc};
use compliflow_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// WorkflowEventKind
// ---------------------------------------------------------------------------

/// What happened to the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEventKind {
    /// A step became `IN_PROGRESS` and its department or assignee should act.
    #[serde(rename = "workflow.step_activated")]
    StepActivated,
    #[serde(rename = "workflow.completed")]
    Completed,
    #[serde(rename = "workflow.rejected")]
    Rejected,
    /// A step sent the workflow back for revision.
    #[serde(rename = "workflow.returned")]
    Returned,
}

impl WorkflowEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StepActivated => "workflow.step_activated",
            Self::Completed => "workflow.completed",
            Self::Rejected => "workflow.rejected",
            Self::Returned => "workflow.returned",
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowEvent
// ---------------------------------------------------------------------------

/// A committed workflow state change.
///
/// Constructed via [`WorkflowEvent::new`] and enriched with
/// [`with_step`](WorkflowEvent::with_step),
/// [`with_actor`](WorkflowEvent::with_actor) and
/// [`with_payload`](WorkflowEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub kind: WorkflowEventKind,
    pub workflow_id: DbId,
    pub reference_number: String,

    /// Step the notification concerns (the activated step for
    /// `StepActivated`, the acting step otherwise).
    pub step_id: Option<DbId>,

    /// Recipient routing: the step's department and optional assignee.
    pub department_id: Option<DbId>,
    pub assigned_to_id: Option<DbId>,

    /// User whose action caused the event.
    pub actor_user_id: Option<DbId>,

    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(
        kind: WorkflowEventKind,
        workflow_id: DbId,
        reference_number: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            workflow_id,
            reference_number: reference_number.into(),
            step_id: None,
            department_id: None,
            assigned_to_id: None,
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the step and its routing.
    pub fn with_step(
        mut self,
        step_id: DbId,
        department_id: DbId,
        assigned_to_id: Option<DbId>,
    ) -> Self {
        self.step_id = Some(step_id);
        self.department_id = Some(department_id);
        self.assigned_to_id = assigned_to_id;
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use compliflow_events::bus::{EventBus, WorkflowEvent, WorkflowEventKind};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(WorkflowEvent::new(WorkflowEventKind::Completed, 1, "WF-2025-00001"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers lose the oldest events and observe
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped silently when
    /// nobody is listening.
    pub fn publish(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
