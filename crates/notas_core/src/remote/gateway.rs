//! Remote note table contract.
//!
//! # Responsibility
//! - Describe CRUD + search + change feed over the hosted `notes` table.
//! - Map table rows (`snake_case` columns) onto the unified [`Note`] type.
//!
//! # Invariants
//! - Every call is scoped by the owning identity (`user_id` column).
//! - `list_notes`/`search_notes` return rows ordered by `created_at DESC`.
//! - Failures come back as `Err(RemoteError)`; nothing is retried here.

use crate::model::note::{Note, NoteBody, NoteId, Timestamp};
use crate::model::session::UserIdentity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::sync::broadcast;

/// Schema holding the notes table.
pub const NOTES_SCHEMA: &str = "public";
/// Hosted notes table name.
pub const NOTES_TABLE: &str = "notes";

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure of any gateway or auth call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport failure; the request may not have reached the service.
    Network(String),
    /// Missing or mismatching session for a row-scoped call.
    Unauthorized(String),
    NotFound(NoteId),
    /// Service rejected the request with an error code.
    Rejected { code: String, message: String },
    /// Response could not be decoded into the expected shape.
    Decode(String),
}

impl RemoteError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Stable short code for logs.
    pub fn code(&self) -> &str {
        match self {
            Self::Network(_) => "network",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Rejected { code, .. } => code.as_str(),
            Self::Decode(_) => "decode",
        }
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(message) => write!(f, "network error: {message}"),
            Self::Unauthorized(message) => write!(f, "unauthorized: {message}"),
            Self::NotFound(id) => write!(f, "remote note not found: {id}"),
            Self::Rejected { code, message } => write!(f, "{message} ({code})"),
            Self::Decode(message) => write!(f, "invalid remote response: {message}"),
        }
    }
}

impl Error for RemoteError {}

/// One row of the hosted `notes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub user_id: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl NoteRow {
    /// Converts a row into the unified note type.
    ///
    /// # Errors
    /// - `Decode` when the row carries a blank id.
    pub fn into_note(self) -> RemoteResult<Note> {
        let id = NoteId::parse(self.id)
            .ok_or_else(|| RemoteError::Decode("row with blank id".to_string()))?;
        Ok(Note {
            id,
            title: self.title,
            content: self.content,
            created_at: self.created_at,
            updated_at: self.updated_at.max(self.created_at),
            owner_id: Some(self.user_id),
        })
    }
}

/// Insert/update payload: `{title, content, user_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRowWrite {
    pub title: String,
    pub content: String,
    pub user_id: String,
}

impl NoteRowWrite {
    pub fn new(owner: &UserIdentity, body: &NoteBody) -> Self {
        Self {
            title: body.title().to_string(),
            content: body.content().to_string(),
            user_id: owner.id.clone(),
        }
    }
}

/// Change-data event kind on the notes table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One change-data feed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteChange {
    pub schema: String,
    pub table: String,
    pub kind: ChangeKind,
    pub note_id: Option<NoteId>,
    pub user_id: Option<String>,
}

impl NoteChange {
    pub fn on_notes(kind: ChangeKind, note_id: Option<NoteId>, user_id: Option<String>) -> Self {
        Self {
            schema: NOTES_SCHEMA.to_string(),
            table: NOTES_TABLE.to_string(),
            kind,
            note_id,
            user_id,
        }
    }

    /// Whether this change belongs to the subscribed schema/table.
    pub fn concerns_notes_table(&self) -> bool {
        self.schema == NOTES_SCHEMA && self.table == NOTES_TABLE
    }
}

/// Receiving end of the change-data feed.
pub type ChangeFeed = broadcast::Receiver<NoteChange>;

/// Async proxy to the hosted notes table.
#[async_trait]
pub trait RemoteNoteGateway: Send + Sync {
    /// All notes owned by `owner`, newest `created_at` first.
    async fn list_notes(&self, owner: &UserIdentity) -> RemoteResult<Vec<Note>>;

    async fn get_note(&self, owner: &UserIdentity, id: &NoteId) -> RemoteResult<Option<Note>>;

    /// Inserts one row; id and timestamps are assigned by the service.
    async fn create_note(&self, owner: &UserIdentity, body: &NoteBody) -> RemoteResult<Note>;

    /// Replaces title/content of one owned row.
    async fn update_note(
        &self,
        owner: &UserIdentity,
        id: &NoteId,
        body: &NoteBody,
    ) -> RemoteResult<Note>;

    /// Deletes one owned row. Deleting a missing row is not an error.
    async fn delete_note(&self, owner: &UserIdentity, id: &NoteId) -> RemoteResult<()>;

    /// Server-side `title ILIKE %q% OR content ILIKE %q%`, newest first.
    async fn search_notes(&self, owner: &UserIdentity, query: &str) -> RemoteResult<Vec<Note>>;

    /// Subscribes to the change-data feed of `public.notes`.
    fn subscribe_changes(&self) -> RemoteResult<ChangeFeed>;
}

#[cfg(test)]
mod tests {
    use super::{ChangeKind, NoteChange, NoteRow, RemoteError};
    use chrono::{Duration, Utc};

    #[test]
    fn row_maps_to_note_with_owner() {
        let created = Utc::now();
        let row = NoteRow {
            id: "42".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            user_id: "u1".to_string(),
            created_at: created,
            updated_at: created - Duration::seconds(1),
        };
        let note = row.into_note().expect("row should map");
        assert_eq!(note.id.as_str(), "42");
        assert_eq!(note.owner_id.as_deref(), Some("u1"));
        assert_eq!(note.updated_at, created);
    }

    #[test]
    fn row_with_blank_id_is_a_decode_error() {
        let now = Utc::now();
        let row = NoteRow {
            id: " ".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            user_id: "u1".to_string(),
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(row.into_note(), Err(RemoteError::Decode(_))));
    }

    #[test]
    fn change_filter_matches_only_public_notes() {
        let change = NoteChange::on_notes(ChangeKind::Insert, None, None);
        assert!(change.concerns_notes_table());

        let other = NoteChange {
            table: "profiles".to_string(),
            ..change
        };
        assert!(!other.concerns_notes_table());
    }

    #[test]
    fn rejected_error_exposes_service_code() {
        let err = RemoteError::rejected("invalid_credentials", "Invalid login credentials");
        assert_eq!(err.code(), "invalid_credentials");
        assert!(err.to_string().contains("Invalid login credentials"));
    }
}
