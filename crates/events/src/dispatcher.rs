//! Fire-and-forget notification dispatch.
//!
//! [`NotificationDispatcher`] subscribes to the [`EventBus`](crate::EventBus)
//! and hands each event to the configured channels on its own task, so a
//! slow or failing endpoint never holds up the loop or the request that
//! published the event. Delivery failures are logged and dropped.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::WorkflowEvent;
use crate::delivery::webhook::WebhookDelivery;

/// Background service routing workflow events to external channels.
pub struct NotificationDispatcher {
    webhook: Option<WebhookDelivery>,
}

impl NotificationDispatcher {
    /// A dispatcher with no channels only logs events.
    pub fn new(webhook: Option<WebhookDelivery>) -> Self {
        Self { webhook }
    }

    /// Run until `cancel` fires or the bus is dropped.
    pub async fn run(
        self,
        mut receiver: broadcast::Receiver<WorkflowEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification dispatcher cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => self.dispatch(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Notification dispatcher lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, notification dispatcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn dispatch(&self, event: WorkflowEvent) {
        tracing::info!(
            event_type = event.kind.as_str(),
            workflow_id = event.workflow_id,
            reference_number = %event.reference_number,
            step_id = ?event.step_id,
            department_id = ?event.department_id,
            assigned_to_id = ?event.assigned_to_id,
            "Workflow notification",
        );

        if let Some(webhook) = &self.webhook {
            let webhook = webhook.clone();
            tokio::spawn(async move {
                if let Err(e) = webhook.deliver(&event).await {
                    tracing::error!(
                        workflow_id = event.workflow_id,
                        event_type = event.kind.as_str(),
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
