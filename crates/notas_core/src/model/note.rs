//! Note domain model.
//!
//! # Responsibility
//! - Define the canonical note record shared by local and remote storage.
//! - Normalize form input (trim + placeholders) before any note is built.
//!
//! # Invariants
//! - A note is never built from input whose title and content are both blank.
//! - `updated_at >= created_at`.
//! - `id` is unique within one store; uniqueness is enforced by the owner of
//!   the canonical list, not by this type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Title stored when the user leaves the title field blank.
pub const UNTITLED_PLACEHOLDER: &str = "Sin título";
/// Content stored when the user leaves the content field blank.
pub const EMPTY_CONTENT_PLACEHOLDER: &str = "Sin contenido";

/// Opaque comparable timestamp. Encoding is left to storage adapters.
pub type Timestamp = DateTime<Utc>;

/// Stable note identifier.
///
/// Locally generated ids are UUIDv4 strings; ids coming from the remote table
/// or from legacy payloads are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Generates a fresh unique id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an externally provided id. Returns `None` for blank values.
    pub fn parse(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validation errors for note input and persisted note records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    /// Title and content are both blank after trimming.
    EmptyNote,
    /// Record carries an empty id.
    BlankId,
    /// Record claims it was updated before it was created.
    UpdatedBeforeCreated(NoteId),
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyNote => write!(f, "note requires a non-empty title or content"),
            Self::BlankId => write!(f, "note id must not be blank"),
            Self::UpdatedBeforeCreated(id) => {
                write!(f, "note {id} has updated_at earlier than created_at")
            }
        }
    }
}

impl Error for NoteValidationError {}

/// Raw `{title, content}` pair as typed by the user.
///
/// Also the shape of the persisted draft slot; missing fields default to
/// empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl NoteInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Whether both fields are empty after trimming.
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.content.trim().is_empty()
    }

    /// Trims both fields and substitutes placeholders for blank ones.
    ///
    /// # Errors
    /// - `EmptyNote` when both fields are blank.
    pub fn normalize(&self) -> Result<NoteBody, NoteValidationError> {
        let title = self.title.trim();
        let content = self.content.trim();
        if title.is_empty() && content.is_empty() {
            return Err(NoteValidationError::EmptyNote);
        }

        Ok(NoteBody {
            title: non_blank_or(title, UNTITLED_PLACEHOLDER),
            content: non_blank_or(content, EMPTY_CONTENT_PLACEHOLDER),
        })
    }
}

/// Validated note fields, only obtainable through [`NoteInput::normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteBody {
    title: String,
    content: String,
}

impl NoteBody {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Canonical note record.
///
/// Serialized with camelCase keys; `ownerId` is omitted for local notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Session identity that owns this note. `None` in local-only mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl Note {
    /// Creates a note with a freshly generated id.
    pub fn new(body: NoteBody, owner_id: Option<String>, now: Timestamp) -> Self {
        Self::with_id(NoteId::generate(), body, owner_id, now)
    }

    /// Creates a note with a caller-provided id (import/remote paths).
    pub fn with_id(id: NoteId, body: NoteBody, owner_id: Option<String>, now: Timestamp) -> Self {
        Self {
            id,
            title: body.title,
            content: body.content,
            created_at: now,
            updated_at: now,
            owner_id,
        }
    }

    /// Replaces title/content and bumps `updated_at`; `created_at` is kept.
    pub fn apply_edit(&mut self, body: NoteBody, now: Timestamp) {
        self.title = body.title;
        self.content = body.content;
        self.updated_at = now.max(self.created_at);
    }

    /// Whether the note was changed after creation.
    pub fn was_edited(&self) -> bool {
        self.updated_at != self.created_at
    }

    /// Case-insensitive substring match on title or content.
    ///
    /// An empty query matches every note.
    pub fn matches(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let needle = query.to_lowercase();
        self.title.to_lowercase().contains(&needle) || self.content.to_lowercase().contains(&needle)
    }

    /// Validates a record read back from storage.
    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(NoteValidationError::BlankId);
        }
        if self.updated_at < self.created_at {
            return Err(NoteValidationError::UpdatedBeforeCreated(self.id.clone()));
        }
        Ok(())
    }
}

/// Filters notes by [`Note::matches`], keeping their order.
pub fn filter_notes(notes: &[Note], query: &str) -> Vec<Note> {
    notes
        .iter()
        .filter(|note| note.matches(query))
        .cloned()
        .collect()
}

fn non_blank_or(value: &str, placeholder: &str) -> String {
    if value.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    }
}
