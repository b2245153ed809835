//! View model and render instructions.
//!
//! # Responsibility
//! - Describe what the UI layer should show, independent of any toolkit.
//! - Format card metadata (relative dates, edited marker).
//!
//! # Invariants
//! - `NotesView.empty_state` is `Some` exactly when `cards` is empty.

use crate::model::note::{Note, NoteId, Timestamp};
use crate::service::error::ErrorKind;
use crate::service::transfer::ExportSnapshot;
use chrono::Datelike;

const SHORT_MONTHS_ES: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sept", "oct", "nov", "dic",
];

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    /// Set when the notification reports a failure.
    pub error_kind: Option<ErrorKind>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            level: kind.level(),
            message: message.into(),
            error_kind: Some(kind),
        }
    }
}

/// Placeholder shown instead of an empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    /// Remote mode without a session.
    SignInRequired,
    /// Nothing to show for the current session or query.
    NoNotes,
}

impl EmptyState {
    pub fn message(self) -> &'static str {
        match self {
            Self::SignInRequired => "Inicia sesión para ver tus notas",
            Self::NoNotes => "No hay notas",
        }
    }
}

/// One rendered note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteCard {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub created_label: String,
    /// Present only for notes edited after creation.
    pub updated_label: Option<String>,
    pub is_editing: bool,
}

impl NoteCard {
    pub fn from_note(note: &Note, editing: Option<&NoteId>, now: Timestamp) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            created_label: relative_date_label(note.created_at, now),
            updated_label: note
                .was_edited()
                .then(|| relative_date_label(note.updated_at, now)),
            is_editing: editing == Some(&note.id),
        }
    }
}

/// Full list snapshot handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesView {
    pub cards: Vec<NoteCard>,
    pub empty_state: Option<EmptyState>,
}

impl NotesView {
    /// Builds the view; `empty` is used only when `notes` is empty.
    pub fn build(
        notes: &[Note],
        editing: Option<&NoteId>,
        empty: EmptyState,
        now: Timestamp,
    ) -> Self {
        let cards = notes
            .iter()
            .map(|note| NoteCard::from_note(note, editing, now))
            .collect::<Vec<_>>();
        let empty_state = cards.is_empty().then_some(empty);
        Self { cards, empty_state }
    }

    /// View shown when notes are hidden behind sign-in.
    pub fn locked() -> Self {
        Self {
            cards: Vec::new(),
            empty_state: Some(EmptyState::SignInRequired),
        }
    }
}

/// Handle for one pending two-step confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfirmationToken(u64);

impl ConfirmationToken {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Instruction emitted by controller handlers for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderInstruction {
    RenderNotes(NotesView),
    ShowSignedIn { email: String },
    ShowSignedOut,
    FillForm { title: String, content: String },
    ClearForm,
    FocusTitle,
    FocusSearch,
    DismissAuthDialog,
    /// Ask the user to confirm deleting `title`; answer with the token.
    ConfirmDelete {
        token: ConfirmationToken,
        title: String,
    },
    /// Ask replace-or-append for `count` valid notes.
    ConfirmImport {
        token: ConfirmationToken,
        count: usize,
    },
    OfferDownload(ExportSnapshot),
    Notify(Notification),
}

/// Card date label: "Hoy", "Ayer", "Hace N días" within a week, otherwise
/// `16 oct 2026`.
pub fn relative_date_label(at: Timestamp, now: Timestamp) -> String {
    let days = (now.date_naive() - at.date_naive()).num_days().abs();
    match days {
        0 => "Hoy".to_string(),
        1 => "Ayer".to_string(),
        2..=6 => format!("Hace {days} días"),
        _ => format!(
            "{} {} {}",
            at.day(),
            SHORT_MONTHS_ES[at.month0() as usize],
            at.year()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{relative_date_label, EmptyState, NoteCard, NotesView};
    use crate::model::note::{Note, NoteInput};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn relative_labels_cover_recent_and_old_dates() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        assert_eq!(relative_date_label(now, now), "Hoy");
        assert_eq!(relative_date_label(now - Duration::days(1), now), "Ayer");
        assert_eq!(relative_date_label(now - Duration::days(4), now), "Hace 4 días");
        assert_eq!(
            relative_date_label(Utc.with_ymd_and_hms(2026, 8, 3, 9, 0, 0).unwrap(), now),
            "3 ago 2026"
        );
    }

    #[test]
    fn card_shows_updated_label_only_after_edit() {
        let now = Utc::now();
        let mut note = Note::new(NoteInput::new("t", "c").normalize().unwrap(), None, now);
        let card = NoteCard::from_note(&note, None, now);
        assert!(card.updated_label.is_none());
        assert!(!card.is_editing);

        note.apply_edit(
            NoteInput::new("t2", "").normalize().unwrap(),
            now + Duration::seconds(1),
        );
        let card = NoteCard::from_note(&note, Some(&note.id), now);
        assert!(card.updated_label.is_some());
        assert!(card.is_editing);
    }

    #[test]
    fn empty_state_only_when_no_cards() {
        let now = Utc::now();
        let view = NotesView::build(&[], None, EmptyState::NoNotes, now);
        assert_eq!(view.empty_state, Some(EmptyState::NoNotes));

        let note = Note::new(NoteInput::new("t", "").normalize().unwrap(), None, now);
        let view = NotesView::build(&[note], None, EmptyState::NoNotes, now);
        assert_eq!(view.empty_state, None);
        assert_eq!(view.cards.len(), 1);
    }
}
