//! Hosted backend collaborators.
//!
//! # Responsibility
//! - Declare the async contracts for the remote notes table and auth.
//! - Ship an in-process backend used by tests and the offline CLI demo.
//!
//! # See also
//! - `service::notes_controller` for how these contracts are consumed.

pub mod gateway;
pub mod memory;
pub mod session;
