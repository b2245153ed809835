//! Core logic for Notas.
//! This crate is the single source of truth for note invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod remote;
pub mod repo;
pub mod service;

pub use config::{AppConfig, BackendConfig, ConfigError, Environment, StorageMode};
pub use logging::{default_log_level, init_logging, init_logging_from, logging_status};
pub use model::note::{Note, NoteId, NoteInput, NoteValidationError, Timestamp};
pub use model::session::{Session, SessionEvent, SessionEventKind, UserIdentity};
pub use remote::gateway::{RemoteError, RemoteNoteGateway};
pub use remote::memory::InMemoryBackend;
pub use remote::session::{AuthProvider, Credentials, SessionManager, SignUpOutcome};
pub use repo::draft_repo::DraftRepository;
pub use repo::kv_repo::{KvError, KvRepository, MemoryKvRepository, SqliteKvRepository};
pub use repo::note_store::{LocalNoteStore, NoteStoreError, StorageError};
pub use service::error::{AppError, ErrorKind};
pub use service::event_loop::{run_event_loop, session_event_forwarder, spawn_change_forwarder};
pub use service::notes_controller::{
    AppEvent, ControllerState, NoteSource, NotesController, RemoteServices, Shortcut,
};
pub use service::transfer::{ExportSnapshot, ImportError, ImportMode};
pub use service::view::{
    ConfirmationToken, EmptyState, NoteCard, Notification, NotificationLevel, NotesView,
    RenderInstruction,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
