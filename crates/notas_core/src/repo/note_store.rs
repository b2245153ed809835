//! Local-mode note store over one durable slot.
//!
//! # Responsibility
//! - Own the canonical note list in local-only mode.
//! - Persist the full list as one JSON document in the `notesApp` slot.
//!
//! # Invariants
//! - Order is most-recent-first by insertion; no secondary sort key.
//! - In-memory state changes only after the slot write succeeded.
//! - Loading never fails: absent or malformed payloads yield an empty list.

use crate::model::note::{filter_notes, Note, NoteId, NoteInput, NoteValidationError};
use crate::repo::kv_repo::{KvError, KvRepository};
use chrono::Utc;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Slot holding the serialized note list.
pub const NOTES_SLOT_KEY: &str = "notesApp";

/// Local persistence failure.
#[derive(Debug)]
pub enum StorageError {
    Kv(KvError),
    Encode(serde_json::Error),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kv(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to encode slot payload: {err}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Kv(err) => Some(err),
            Self::Encode(err) => Some(err),
        }
    }
}

impl From<KvError> for StorageError {
    fn from(value: KvError) -> Self {
        Self::Kv(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

/// Error for note store writes.
#[derive(Debug)]
pub enum NoteStoreError {
    Validation(NoteValidationError),
    Storage(StorageError),
}

impl Display for NoteStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for NoteStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<NoteValidationError> for NoteStoreError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StorageError> for NoteStoreError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

pub type NoteStoreResult<T> = Result<T, NoteStoreError>;

/// Note store backed by a [`KvRepository`] slot.
pub struct LocalNoteStore<K: KvRepository> {
    kv: K,
    notes: Vec<Note>,
}

impl<K: KvRepository> LocalNoteStore<K> {
    /// Creates a store and loads the persisted list.
    pub fn open(kv: K) -> Self {
        let mut store = Self {
            kv,
            notes: Vec::new(),
        };
        store.load();
        store
    }

    /// Re-reads the persisted list, replacing the in-memory copy.
    ///
    /// Absent slot -> empty list. Malformed payload -> empty list plus an
    /// error log; the broken payload is left in place until the next write.
    pub fn load(&mut self) -> &[Note] {
        self.notes = match self.kv.get(NOTES_SLOT_KEY) {
            Ok(Some(raw)) => decode_notes(&raw),
            Ok(None) => {
                info!("event=notes_load module=store status=empty");
                Vec::new()
            }
            Err(err) => {
                error!(
                    "event=notes_load module=store status=error error_code=slot_read_failed error={err}"
                );
                Vec::new()
            }
        };
        &self.notes
    }

    /// Canonical list, most recent first.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    /// Serializes and writes the full list to the slot.
    pub fn persist(&self, notes: &[Note]) -> Result<(), StorageError> {
        let payload = serde_json::to_string(notes)?;
        if let Err(err) = self.kv.set(NOTES_SLOT_KEY, &payload) {
            error!(
                "event=notes_persist module=store status=error error_code=slot_write_failed count={} error={err}",
                notes.len()
            );
            return Err(err.into());
        }
        Ok(())
    }

    /// Creates or edits one note.
    ///
    /// With `editing_id` matching an existing note: replaces title/content,
    /// bumps `updated_at`, keeps `created_at` and position. Otherwise a new
    /// note is inserted at the front.
    ///
    /// # Errors
    /// - `Validation(EmptyNote)` when title and content are both blank.
    /// - `Storage` when the slot write fails; the list is left unchanged.
    pub fn save(&mut self, input: &NoteInput, editing_id: Option<&NoteId>) -> NoteStoreResult<Note> {
        let body = input.normalize()?;
        let now = Utc::now();
        let mut next = self.notes.clone();

        let edited_index =
            editing_id.and_then(|id| next.iter().position(|note| &note.id == id));
        let saved = match edited_index {
            Some(index) => {
                next[index].apply_edit(body, now);
                next[index].clone()
            }
            None => {
                if let Some(id) = editing_id {
                    warn!("event=note_save module=store status=edit_target_missing note_id={id}");
                }
                let note = Note::new(body, None, now);
                next.insert(0, note.clone());
                note
            }
        };

        self.persist(&next)?;
        self.notes = next;
        info!(
            "event=note_save module=store status=ok note_id={} mode={}",
            saved.id,
            if edited_index.is_some() { "update" } else { "create" }
        );
        Ok(saved)
    }

    /// Removes one note. Returns `false` (and writes nothing) if absent.
    pub fn delete(&mut self, id: &NoteId) -> Result<bool, StorageError> {
        if self.get(id).is_none() {
            return Ok(false);
        }
        let next = self
            .notes
            .iter()
            .filter(|note| &note.id != id)
            .cloned()
            .collect::<Vec<_>>();
        self.persist(&next)?;
        self.notes = next;
        info!("event=note_delete module=store status=ok note_id={id}");
        Ok(true)
    }

    /// Case-insensitive substring search on title or content.
    ///
    /// Empty query returns the full list unfiltered.
    pub fn search(&self, query: &str) -> Vec<Note> {
        filter_notes(&self.notes, query)
    }

    /// Replaces the whole list (import, replace mode).
    pub fn replace_all(&mut self, notes: Vec<Note>) -> Result<(), StorageError> {
        self.persist(&notes)?;
        info!(
            "event=notes_replace module=store status=ok previous={} count={}",
            self.notes.len(),
            notes.len()
        );
        self.notes = notes;
        Ok(())
    }

    /// Appends notes after the existing ones (import, append mode).
    pub fn append(&mut self, notes: Vec<Note>) -> Result<(), StorageError> {
        let appended = notes.len();
        let mut next = self.notes.clone();
        next.extend(notes);
        self.persist(&next)?;
        self.notes = next;
        info!("event=notes_append module=store status=ok appended={appended}");
        Ok(())
    }
}

fn decode_notes(raw: &str) -> Vec<Note> {
    let notes = match serde_json::from_str::<Vec<Note>>(raw) {
        Ok(notes) => notes,
        Err(err) => {
            error!(
                "event=notes_load module=store status=error error_code=malformed_payload error={err}"
            );
            return Vec::new();
        }
    };

    let total = notes.len();
    let valid = notes
        .into_iter()
        .filter(|note| match note.validate() {
            Ok(()) => true,
            Err(err) => {
                warn!("event=notes_load module=store status=skipped_record error={err}");
                false
            }
        })
        .collect::<Vec<_>>();
    info!(
        "event=notes_load module=store status=ok count={} skipped={}",
        valid.len(),
        total - valid.len()
    );
    valid
}
