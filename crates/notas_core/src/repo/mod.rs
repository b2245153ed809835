//! Local persistence: durable slots, the note store and the draft slot.
//!
//! # Responsibility
//! - Define the slot storage contract used by local mode.
//! - Keep serialization of the note list and the draft inside this layer.
//!
//! # Invariants
//! - Each logical record (note list, draft) lives in exactly one slot.
//! - Writes replace a slot as a whole; there are no partial writes.

pub mod draft_repo;
pub mod kv_repo;
pub mod note_store;
