//! Domain logic for the compliance approval workflow engine.
//!
//! This crate has no database dependencies. Everything here operates on
//! plain data loaded by the `db` crate and handed in by the API layer.

pub mod directory;
pub mod error;
pub mod roles;
pub mod types;
pub mod workflow;
