//! Import parsing and export snapshots.
//!
//! # Responsibility
//! - Turn an uploaded JSON document into validated import candidates.
//! - Build the pretty-printed backup document offered for download.
//!
//! # Invariants
//! - Candidates always carry a non-blank title or content.
//! - Materialized local notes never collide on id with each other or with
//!   the notes they are appended to.

use crate::model::note::{Note, NoteId, NoteInput, Timestamp};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Import rejection reasons.
#[derive(Debug)]
pub enum ImportError {
    /// Source file name does not end in `.json`.
    NotJsonFile(String),
    Malformed(serde_json::Error),
    /// Document parsed but the top level is not an array.
    NotAnArray,
    /// No entry survived filtering.
    NoValidNotes,
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotJsonFile(_) => "not_json_file",
            Self::Malformed(_) => "malformed_json",
            Self::NotAnArray => "not_an_array",
            Self::NoValidNotes => "no_valid_notes",
        }
    }
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotJsonFile(name) => write!(f, "import file `{name}` is not a .json file"),
            Self::Malformed(err) => write!(f, "import payload is not valid JSON: {err}"),
            Self::NotAnArray => write!(f, "import payload must be a JSON array"),
            Self::NoValidNotes => write!(f, "import payload contains no valid notes"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

/// How surviving candidates are merged into the canonical list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Delete every canonical note, then insert all candidates.
    Replace,
    /// Insert all candidates after the existing notes.
    Append,
}

/// One import entry that passed filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportCandidate {
    pub input: NoteInput,
    pub id: Option<NoteId>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

/// Rejects sources that are not `.json` files.
pub fn check_import_file_name(file_name: &str) -> Result<(), ImportError> {
    if file_name.trim().to_ascii_lowercase().ends_with(".json") {
        Ok(())
    } else {
        Err(ImportError::NotJsonFile(file_name.to_string()))
    }
}

/// Parses an import document into candidates.
///
/// Non-object entries and entries whose title and content are both blank
/// are dropped. Non-string `title`/`content` values count as absent.
///
/// # Errors
/// - `Malformed` / `NotAnArray` for documents of the wrong shape.
/// - `NoValidNotes` when nothing survives filtering.
pub fn parse_import_payload(raw: &str) -> Result<Vec<ImportCandidate>, ImportError> {
    let document: Value = serde_json::from_str(raw).map_err(ImportError::Malformed)?;
    let Value::Array(entries) = document else {
        return Err(ImportError::NotAnArray);
    };

    let candidates = entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(candidate_from_object)
        .collect::<Vec<_>>();
    if candidates.is_empty() {
        return Err(ImportError::NoValidNotes);
    }
    Ok(candidates)
}

fn candidate_from_object(object: &Map<String, Value>) -> Option<ImportCandidate> {
    let input = NoteInput::new(
        string_field(object, &["title"]).unwrap_or_default(),
        string_field(object, &["content"]).unwrap_or_default(),
    );
    if input.is_blank() {
        return None;
    }

    let id = match object.get("id") {
        Some(Value::String(value)) => NoteId::parse(value.as_str()),
        Some(Value::Number(value)) => NoteId::parse(value.to_string()),
        _ => None,
    };
    let created_at = timestamp_field(object, &["createdAt", "created_at"]);
    let updated_at = timestamp_field(object, &["updatedAt", "updated_at"]);
    Some(ImportCandidate {
        input,
        id,
        created_at,
        updated_at,
    })
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn timestamp_field(object: &Map<String, Value>, keys: &[&str]) -> Option<Timestamp> {
    let raw = string_field(object, keys)?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

/// Builds local notes from candidates, preserving ids and timestamps where
/// possible.
///
/// Ids already present in `existing` or repeated within the batch are
/// regenerated. Missing timestamps default to `now`.
pub fn materialize_local(
    candidates: Vec<ImportCandidate>,
    existing: &[Note],
    now: Timestamp,
) -> Vec<Note> {
    let mut taken = existing
        .iter()
        .map(|note| note.id.clone())
        .collect::<HashSet<_>>();

    candidates
        .into_iter()
        .filter_map(|candidate| {
            let body = candidate.input.normalize().ok()?;
            let id = match candidate.id {
                Some(id) if !taken.contains(&id) => id,
                _ => NoteId::generate(),
            };
            taken.insert(id.clone());

            let created_at = candidate.created_at.unwrap_or(now);
            let mut note = Note::with_id(id, body, None, created_at);
            note.updated_at = candidate.updated_at.unwrap_or(created_at).max(created_at);
            Some(note)
        })
        .collect()
}

/// Downloadable backup document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSnapshot {
    pub file_name: String,
    pub contents: String,
    pub note_count: usize,
}

/// `notas-backup-<YYYY-MM-DD>.json`
pub fn export_file_name(now: Timestamp) -> String {
    format!("notas-backup-{}.json", now.format("%Y-%m-%d"))
}

/// Serializes the canonical list as a pretty-printed JSON array.
pub fn build_export(notes: &[Note], now: Timestamp) -> Result<ExportSnapshot, serde_json::Error> {
    Ok(ExportSnapshot {
        file_name: export_file_name(now),
        contents: serde_json::to_string_pretty(notes)?,
        note_count: notes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::{
        build_export, check_import_file_name, materialize_local, parse_import_payload,
        ImportError,
    };
    use crate::model::note::{Note, NoteId, NoteInput, EMPTY_CONTENT_PLACEHOLDER};
    use chrono::{TimeZone, Utc};

    #[test]
    fn file_name_must_end_in_json() {
        assert!(check_import_file_name("backup.JSON").is_ok());
        assert!(matches!(
            check_import_file_name("backup.txt"),
            Err(ImportError::NotJsonFile(_))
        ));
    }

    #[test]
    fn parse_drops_blank_and_non_object_entries() {
        let raw = r#"[
            {"title": "A", "content": ""},
            {"title": "  ", "content": " "},
            {"title": 42, "content": "solo contenido"},
            "not an object",
            {"other": true}
        ]"#;
        let candidates = parse_import_payload(raw).expect("two entries should survive");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].input.title, "A");
        assert_eq!(candidates[1].input.title, "");
        assert_eq!(candidates[1].input.content, "solo contenido");
    }

    #[test]
    fn parse_rejects_wrong_shapes() {
        assert!(matches!(
            parse_import_payload("{\"title\": \"A\"}"),
            Err(ImportError::NotAnArray)
        ));
        assert!(matches!(
            parse_import_payload("[{\"title\": \"\"}]"),
            Err(ImportError::NoValidNotes)
        ));
        assert!(matches!(
            parse_import_payload("not json"),
            Err(ImportError::Malformed(_))
        ));
    }

    #[test]
    fn parse_accepts_legacy_numeric_ids_and_snake_case_timestamps() {
        let raw = r#"[{"id": 1700000000000, "title": "t",
                       "created_at": "2024-01-02T03:04:05Z",
                       "updated_at": "2024-01-03T03:04:05Z"}]"#;
        let candidate = parse_import_payload(raw).unwrap().remove(0);
        assert_eq!(candidate.id.unwrap().as_str(), "1700000000000");
        assert_eq!(
            candidate.created_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
        assert!(candidate.updated_at.is_some());
    }

    #[test]
    fn materialize_regenerates_colliding_ids_and_fills_placeholders() {
        let now = Utc::now();
        let existing = Note::with_id(
            NoteId::parse("dup").unwrap(),
            NoteInput::new("x", "").normalize().unwrap(),
            None,
            now,
        );
        let raw = r#"[{"id": "dup", "title": "A"}, {"id": "fresh", "title": "B"},
                      {"id": "fresh", "title": "C"}]"#;
        let notes = materialize_local(parse_import_payload(raw).unwrap(), &[existing], now);

        assert_eq!(notes.len(), 3);
        assert_ne!(notes[0].id.as_str(), "dup");
        assert_eq!(notes[1].id.as_str(), "fresh");
        assert_ne!(notes[2].id.as_str(), "fresh");
        assert_eq!(notes[0].content, EMPTY_CONTENT_PLACEHOLDER);
    }

    #[test]
    fn export_is_a_pretty_array_with_dated_file_name() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let note = Note::new(NoteInput::new("t", "c").normalize().unwrap(), None, now);
        let snapshot = build_export(std::slice::from_ref(&note), now).unwrap();

        assert_eq!(snapshot.file_name, "notas-backup-2026-10-16.json");
        assert_eq!(snapshot.note_count, 1);
        assert!(snapshot.contents.contains('\n'));
        let decoded: Vec<Note> = serde_json::from_str(&snapshot.contents).unwrap();
        assert_eq!(decoded, vec![note]);
    }
}
