//! Request extractors.
//!
//! - [`auth::AuthUser`] -- the validated JWT subject.
//! - [`auth::CurrentActor`] -- the subject resolved through the actor
//!   directory, with department membership.

pub mod auth;
