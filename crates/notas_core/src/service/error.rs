//! Controller-level failure classification.
//!
//! # Invariants
//! - Every failure reaching the controller maps to exactly one [`ErrorKind`].
//! - The notification level is derived from the kind, never chosen ad hoc.

use crate::model::note::NoteValidationError;
use crate::remote::gateway::RemoteError;
use crate::repo::note_store::{NoteStoreError, StorageError};
use crate::service::transfer::ImportError;
use crate::service::view::NotificationLevel;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Coarse failure category surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Storage,
    Remote,
    AuthRequired,
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Storage => "storage",
            Self::Remote => "remote",
            Self::AuthRequired => "auth_required",
            Self::Unavailable => "unavailable",
        }
    }

    pub fn level(self) -> NotificationLevel {
        match self {
            Self::Validation | Self::AuthRequired | Self::Unavailable => NotificationLevel::Warning,
            Self::Storage | Self::Remote => NotificationLevel::Error,
        }
    }
}

/// Any failure handled by the notes controller.
#[derive(Debug)]
pub enum AppError {
    InvalidNote(NoteValidationError),
    InvalidImport(ImportError),
    /// Sign-in form submitted with an empty e-mail or password.
    MissingCredentials,
    Storage(StorageError),
    Remote(RemoteError),
    /// Write attempted while no session is active in remote mode.
    AuthRequired,
    /// Operation has no meaning in the active storage mode.
    Unavailable(&'static str),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidNote(_) | Self::InvalidImport(_) | Self::MissingCredentials => {
                ErrorKind::Validation
            }
            Self::Storage(_) => ErrorKind::Storage,
            Self::Remote(_) => ErrorKind::Remote,
            Self::AuthRequired => ErrorKind::AuthRequired,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    pub fn level(&self) -> NotificationLevel {
        self.kind().level()
    }

    /// Stable code for structured log lines.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidNote(_) => "invalid_note",
            Self::InvalidImport(err) => err.code(),
            Self::MissingCredentials => "missing_credentials",
            Self::Storage(_) => "storage_failed",
            Self::Remote(err) => err.code(),
            Self::AuthRequired => "auth_required",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNote(err) => write!(f, "{err}"),
            Self::InvalidImport(err) => write!(f, "{err}"),
            Self::MissingCredentials => write!(f, "e-mail and password are required"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
            Self::AuthRequired => write!(f, "an authenticated session is required"),
            Self::Unavailable(what) => write!(f, "{what} is unavailable in this mode"),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidNote(err) => Some(err),
            Self::InvalidImport(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NoteValidationError> for AppError {
    fn from(value: NoteValidationError) -> Self {
        Self::InvalidNote(value)
    }
}

impl From<ImportError> for AppError {
    fn from(value: ImportError) -> Self {
        Self::InvalidImport(value)
    }
}

impl From<StorageError> for AppError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<RemoteError> for AppError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

impl From<NoteStoreError> for AppError {
    fn from(value: NoteStoreError) -> Self {
        match value {
            NoteStoreError::Validation(err) => Self::InvalidNote(err),
            NoteStoreError::Storage(err) => Self::Storage(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, ErrorKind};
    use crate::model::note::NoteValidationError;
    use crate::remote::gateway::RemoteError;
    use crate::repo::note_store::NoteStoreError;
    use crate::service::view::NotificationLevel;

    #[test]
    fn kinds_map_to_notification_levels() {
        assert_eq!(AppError::AuthRequired.level(), NotificationLevel::Warning);
        assert_eq!(
            AppError::from(NoteValidationError::EmptyNote).level(),
            NotificationLevel::Warning
        );
        let remote = AppError::from(RemoteError::Network("down".to_string()));
        assert_eq!(remote.kind(), ErrorKind::Remote);
        assert_eq!(remote.level(), NotificationLevel::Error);
        assert_eq!(remote.code(), "network");
    }

    #[test]
    fn store_errors_split_into_validation_and_storage() {
        let err = AppError::from(NoteStoreError::Validation(NoteValidationError::EmptyNote));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
