//! SQLite bootstrap and schema migrations for the local durable slots.
//!
//! # Responsibility
//! - Open and configure SQLite connections backing local storage.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Slot reads/writes must not happen before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failures while opening or migrating the slot database.
#[derive(Debug)]
pub enum DbError {
    /// The database file could not be opened at all.
    Open(rusqlite::Error),
    /// A single migration step failed; the transaction was rolled back.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    /// The file was written by a newer build with more migrations.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    Sqlite(rusqlite::Error),
}

impl DbError {
    /// Stable code used in `error_code=` log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Open(_) => "slot_db_open_failed",
            Self::Migration { .. } => "slot_db_migration_failed",
            Self::UnsupportedSchemaVersion { .. } => "slot_db_schema_too_new",
            Self::Sqlite(_) => "slot_db_sqlite",
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(err) => write!(f, "could not open slot database: {err}"),
            Self::Migration { version, source } => {
                write!(f, "slot database migration {version} failed: {source}")
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "slot database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Sqlite(err) => write!(f, "slot database error: {err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Open(err) | Self::Sqlite(err) => Some(err),
            Self::Migration { source, .. } => Some(source),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::DbError;
    use std::error::Error;

    #[test]
    fn messages_and_codes_name_the_slot_database() {
        let migration = DbError::Migration {
            version: 2,
            source: rusqlite::Error::InvalidQuery,
        };
        assert_eq!(migration.code(), "slot_db_migration_failed");
        assert!(migration.to_string().starts_with("slot database migration 2 failed"));
        assert!(migration.source().is_some());

        let too_new = DbError::UnsupportedSchemaVersion {
            db_version: 9,
            latest_supported: 1,
        };
        assert_eq!(too_new.code(), "slot_db_schema_too_new");
        assert_eq!(
            too_new.to_string(),
            "slot database schema version 9 is newer than supported 1"
        );
        assert!(too_new.source().is_none());

        let open = DbError::Open(rusqlite::Error::InvalidQuery);
        assert_eq!(open.code(), "slot_db_open_failed");
        assert!(open.to_string().starts_with("could not open slot database"));
    }
}
