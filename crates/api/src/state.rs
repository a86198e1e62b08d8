use std::sync::Arc;

use compliflow_core::directory::ActorDirectory;
use compliflow_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone; everything heavy sits behind an `Arc` or is already a
/// handle.
#[derive(Clone)]
pub struct AppState {
    pub pool: compliflow_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Resolves token subjects to actors with department membership.
    pub directory: Arc<dyn ActorDirectory>,
    /// Committed workflow changes are published here for notification.
    pub event_bus: Arc<EventBus>,
}
