//! Durable key/value slot contracts and implementations.
//!
//! # Responsibility
//! - Model the browser-style local storage: named slots holding one string.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - `set` replaces the whole slot value atomically.
//! - `remove` of a missing slot is a no-op.

use crate::db::{open_db, open_db_in_memory, DbError};
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

pub type KvResult<T> = Result<T, KvError>;

/// Slot storage failure.
#[derive(Debug)]
pub enum KvError {
    Db(DbError),
    /// Value does not fit the configured slot quota.
    QuotaExceeded {
        key: String,
        len: usize,
        max: usize,
    },
    /// Backend refused the write (disabled storage, read-only media...).
    Unavailable(String),
    MissingRequiredTable(&'static str),
}

impl Display for KvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::QuotaExceeded { key, len, max } => {
                write!(f, "slot `{key}` value of {len} bytes exceeds quota of {max}")
            }
            Self::Unavailable(message) => write!(f, "slot storage unavailable: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table: {table}"),
        }
    }
}

impl Error for KvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for KvError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for KvError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Named string slots.
pub trait KvRepository {
    fn get(&self, key: &str) -> KvResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> KvResult<()>;
    fn remove(&self, key: &str) -> KvResult<()>;
}

impl<T: KvRepository + ?Sized> KvRepository for Rc<T> {
    fn get(&self, key: &str) -> KvResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> KvResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        (**self).remove(key)
    }
}

impl<T: KvRepository + ?Sized> KvRepository for Arc<T> {
    fn get(&self, key: &str) -> KvResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> KvResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        (**self).remove(key)
    }
}

/// SQLite-backed slot storage.
pub struct SqliteKvRepository {
    conn: Connection,
}

impl SqliteKvRepository {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - `MissingRequiredTable` when the slot table is absent.
    pub fn try_new(conn: Connection) -> KvResult<Self> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = 'kv_slots'
            );",
            [],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(KvError::MissingRequiredTable("kv_slots"));
        }
        Ok(Self { conn })
    }

    /// Opens (or creates) a slot database file.
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens a throwaway in-memory slot database.
    pub fn in_memory() -> KvResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }
}

impl KvRepository for SqliteKvRepository {
    fn get(&self, key: &str) -> KvResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT slot_value FROM kv_slots WHERE slot_key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> KvResult<()> {
        self.conn.execute(
            "INSERT INTO kv_slots (slot_key, slot_value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now') * 1000)
             ON CONFLICT(slot_key) DO UPDATE SET
                slot_value = excluded.slot_value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        self.conn
            .execute("DELETE FROM kv_slots WHERE slot_key = ?1;", [key])?;
        Ok(())
    }
}

/// Process-local slot storage with an optional per-value quota.
///
/// Mirrors the failure modes of browser storage so callers can exercise
/// quota and disabled-storage paths.
#[derive(Debug, Default)]
pub struct MemoryKvRepository {
    slots: RefCell<BTreeMap<String, String>>,
    max_value_len: Option<usize>,
    writes_disabled: Cell<bool>,
}

impl MemoryKvRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects values longer than `max_value_len` bytes.
    pub fn with_quota(max_value_len: usize) -> Self {
        Self {
            max_value_len: Some(max_value_len),
            ..Self::default()
        }
    }

    /// Makes every subsequent `set`/`remove` fail until re-enabled.
    pub fn set_writes_disabled(&self, disabled: bool) {
        self.writes_disabled.set(disabled);
    }

    /// Writes a raw slot value, bypassing quota and disabled state.
    pub fn seed(&self, key: &str, value: &str) {
        self.slots
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn ensure_writable(&self) -> KvResult<()> {
        if self.writes_disabled.get() {
            return Err(KvError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl KvRepository for MemoryKvRepository {
    fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.slots.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> KvResult<()> {
        self.ensure_writable()?;
        if let Some(max) = self.max_value_len {
            if value.len() > max {
                return Err(KvError::QuotaExceeded {
                    key: key.to_string(),
                    len: value.len(),
                    max,
                });
            }
        }
        self.slots
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> KvResult<()> {
        self.ensure_writable()?;
        self.slots.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{KvError, KvRepository, MemoryKvRepository, SqliteKvRepository};
    use rusqlite::Connection;
    use std::rc::Rc;

    #[test]
    fn sqlite_slots_roundtrip_and_overwrite() {
        let repo = SqliteKvRepository::in_memory().expect("in-memory slots should open");
        assert_eq!(repo.get("notesApp").unwrap(), None);

        repo.set("notesApp", "[]").unwrap();
        repo.set("notesApp", "[1]").unwrap();
        assert_eq!(repo.get("notesApp").unwrap().as_deref(), Some("[1]"));

        repo.remove("notesApp").unwrap();
        repo.remove("notesApp").unwrap();
        assert_eq!(repo.get("notesApp").unwrap(), None);
    }

    #[test]
    fn sqlite_slots_reject_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteKvRepository::try_new(conn)
            .err()
            .expect("unmigrated connection must be rejected");
        assert!(matches!(err, KvError::MissingRequiredTable("kv_slots")));
    }

    #[test]
    fn memory_slots_enforce_quota() {
        let repo = MemoryKvRepository::with_quota(4);
        repo.set("k", "1234").unwrap();
        let err = repo.set("k", "12345").unwrap_err();
        assert!(matches!(err, KvError::QuotaExceeded { len: 5, max: 4, .. }));
        assert_eq!(repo.get("k").unwrap().as_deref(), Some("1234"));
    }

    #[test]
    fn memory_slots_can_disable_writes() {
        let repo = MemoryKvRepository::new();
        repo.set_writes_disabled(true);
        assert!(matches!(repo.set("k", "v"), Err(KvError::Unavailable(_))));
        repo.set_writes_disabled(false);
        repo.set("k", "v").unwrap();
    }

    #[test]
    fn shared_handles_see_the_same_slots() {
        let repo = Rc::new(MemoryKvRepository::new());
        let other = Rc::clone(&repo);
        repo.set("k", "v").unwrap();
        assert_eq!(other.get("k").unwrap().as_deref(), Some("v"));
    }
}
