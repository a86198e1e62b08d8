//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that take
//! `&PgPool`, or `&mut PgConnection` when they must run inside the caller's
//! transaction.

pub mod approval_repo;
pub mod directory_repo;
pub mod document_repo;
pub mod step_repo;
pub mod workflow_repo;

pub use approval_repo::ApprovalRepo;
pub use directory_repo::{DepartmentRepo, PgActorDirectory, UserRepo};
pub use document_repo::DocumentRepo;
pub use step_repo::StepRepo;
pub use workflow_repo::WorkflowRepo;
