pub mod document;
pub mod workflow;
