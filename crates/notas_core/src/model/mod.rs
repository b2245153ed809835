//! Domain model for notes and sessions.
//!
//! # Responsibility
//! - Define the note record shared by the local store and the remote table.
//! - Define session identity and auth change events.
//!
//! # Invariants
//! - Notes are only built from normalized input (`NoteBody`).
//! - Timestamps are opaque comparable values; encoding belongs to adapters.

pub mod note;
pub mod session;
