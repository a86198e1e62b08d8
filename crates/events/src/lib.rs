//! Compliflow event bus and notification delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`WorkflowEvent`]: the envelope published after every committed
//!   workflow state change.
//! - [`delivery`]: external delivery channels.
//! - [`NotificationDispatcher`]: background task that forwards events to
//!   the configured channels without ever failing the originating request.

pub mod bus;
pub mod delivery;
pub mod dispatcher;

pub use bus::{EventBus, WorkflowEvent, WorkflowEventKind};
pub use delivery::webhook::{WebhookDelivery, WebhookError};
pub use dispatcher::NotificationDispatcher;
