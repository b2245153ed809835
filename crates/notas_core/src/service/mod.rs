//! Use-case layer between storage collaborators and the UI.
//!
//! # Responsibility
//! - Reconcile the canonical note list with what is rendered.
//! - Keep UI layers decoupled from storage and backend details.

pub mod cache;
pub mod draft;
pub mod error;
pub mod event_loop;
pub mod notes_controller;
pub mod transfer;
pub mod view;
