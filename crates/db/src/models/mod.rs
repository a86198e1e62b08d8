//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and the `Create*` DTOs used for inserts.

pub mod approval;
pub mod directory;
pub mod document;
pub mod workflow;
