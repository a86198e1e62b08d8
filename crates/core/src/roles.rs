//! Role name constants carried in access-token claims.

/// Full administrative access.
pub const ROLE_ADMIN: &str = "admin";

/// Compliance managers may create and remove workflow definitions.
pub const ROLE_MANAGER: &str = "manager";

/// Regular department member; may act on steps routed to them.
pub const ROLE_MEMBER: &str = "member";

/// Whether the role may create or delete workflow instances.
pub fn can_manage_workflows(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_MANAGER
}
