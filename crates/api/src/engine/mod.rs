//! Workflow engine orchestration.
//!
//! Wraps the pure state machine from `compliflow_core` in database
//! transactions and publishes notifications after commit.

pub mod workflow;
