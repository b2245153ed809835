use notas_core::db::migrations::latest_version;
use notas_core::db::{open_db, open_db_in_memory, DbError};
use notas_core::{KvError, KvRepository, SqliteKvRepository};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "kv_slots");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notas.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "kv_slots");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(matches!(
        SqliteKvRepository::open(&path),
        Err(KvError::Db(DbError::UnsupportedSchemaVersion { .. }))
    ));
}

#[test]
fn slot_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slots.sqlite3");

    let kv = SqliteKvRepository::open(&path).unwrap();
    kv.set("notesApp", "[]").unwrap();
    kv.set("notesApp", "[1]").unwrap();
    kv.set("notesAppDraft", "{}").unwrap();
    kv.remove("notesAppDraft").unwrap();
    kv.remove("missing").unwrap();
    drop(kv);

    let kv = SqliteKvRepository::open(&path).unwrap();
    assert_eq!(kv.get("notesApp").unwrap().as_deref(), Some("[1]"));
    assert_eq!(kv.get("notesAppDraft").unwrap(), None);
}

#[test]
fn wrapping_unmigrated_connection_is_rejected() {
    let conn = Connection::open_in_memory().unwrap();
    assert!(matches!(
        SqliteKvRepository::try_new(conn),
        Err(KvError::MissingRequiredTable("kv_slots"))
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
