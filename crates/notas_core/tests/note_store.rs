use notas_core::repo::note_store::NOTES_SLOT_KEY;
use notas_core::{
    KvRepository, LocalNoteStore, MemoryKvRepository, NoteId, NoteInput, NoteStoreError,
    NoteValidationError, SqliteKvRepository, StorageError,
};
use std::rc::Rc;

fn memory_store() -> (LocalNoteStore<Rc<MemoryKvRepository>>, Rc<MemoryKvRepository>) {
    let kv = Rc::new(MemoryKvRepository::new());
    (LocalNoteStore::open(Rc::clone(&kv)), kv)
}

#[test]
fn save_trims_fields_and_fills_placeholders() {
    let (mut store, _kv) = memory_store();

    let saved = store
        .save(&NoteInput::new("  Compra  ", "   "), None)
        .unwrap();
    assert_eq!(saved.title, "Compra");
    assert_eq!(saved.content, "Sin contenido");
    assert_eq!(saved.owner_id, None);

    let untitled = store.save(&NoteInput::new("", " pan "), None).unwrap();
    assert_eq!(untitled.title, "Sin título");
    assert_eq!(untitled.content, "pan");

    assert_eq!(store.search("").len(), 2);
    assert_eq!(store.notes()[0].id, untitled.id, "newest note goes first");
}

#[test]
fn blank_save_is_rejected_without_writing() {
    let (mut store, kv) = memory_store();
    store.save(&NoteInput::new("A", ""), None).unwrap();
    let before = kv.get(NOTES_SLOT_KEY).unwrap();

    let err = store.save(&NoteInput::new(" ", "\n"), None).unwrap_err();
    assert!(matches!(
        err,
        NoteStoreError::Validation(NoteValidationError::EmptyNote)
    ));
    assert_eq!(store.notes().len(), 1);
    assert_eq!(kv.get(NOTES_SLOT_KEY).unwrap(), before);
}

#[test]
fn edit_keeps_id_position_and_creation_time() {
    let (mut store, _kv) = memory_store();
    let first = store.save(&NoteInput::new("uno", ""), None).unwrap();
    store.save(&NoteInput::new("dos", ""), None).unwrap();

    let edited = store
        .save(&NoteInput::new("uno editada", "texto"), Some(&first.id))
        .unwrap();
    assert_eq!(edited.id, first.id);
    assert_eq!(edited.created_at, first.created_at);
    assert!(edited.updated_at >= edited.created_at);
    assert_eq!(store.notes().len(), 2);
    assert_eq!(store.notes()[1].title, "uno editada");
}

#[test]
fn missing_edit_target_creates_a_new_note() {
    let (mut store, _kv) = memory_store();
    let ghost = NoteId::parse("ghost").unwrap();

    let saved = store.save(&NoteInput::new("nueva", ""), Some(&ghost)).unwrap();
    assert_ne!(saved.id, ghost);
    assert_eq!(store.notes().len(), 1);
}

#[test]
fn delete_removes_once_and_then_is_a_no_op() {
    let (mut store, _kv) = memory_store();
    let note = store.save(&NoteInput::new("A", ""), None).unwrap();

    assert!(store.delete(&note.id).unwrap());
    assert!(!store.delete(&note.id).unwrap());
    assert!(store.search("").iter().all(|kept| kept.id != note.id));
}

#[test]
fn search_is_case_insensitive_over_title_or_content() {
    let (mut store, _kv) = memory_store();
    store.save(&NoteInput::new("Lista de COMPRAS", ""), None).unwrap();
    store.save(&NoteInput::new("Ideas", "comprar flores"), None).unwrap();
    store.save(&NoteInput::new("Viaje", "Lisboa"), None).unwrap();

    let hits = store.search("compra");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].title, "Ideas");
    assert_eq!(hits[1].title, "Lista de COMPRAS");
    assert!(store.search("zzz").is_empty());
}

#[test]
fn failed_write_leaves_list_unchanged() {
    let (mut store, kv) = memory_store();
    store.save(&NoteInput::new("A", ""), None).unwrap();

    kv.set_writes_disabled(true);
    let err = store.save(&NoteInput::new("B", ""), None).unwrap_err();
    assert!(matches!(err, NoteStoreError::Storage(StorageError::Kv(_))));
    assert_eq!(store.notes().len(), 1);

    let id = store.notes()[0].id.clone();
    assert!(store.delete(&id).is_err());
    assert_eq!(store.notes().len(), 1);
}

#[test]
fn quota_overflow_is_a_storage_error() {
    let kv = Rc::new(MemoryKvRepository::with_quota(64));
    let mut store = LocalNoteStore::open(Rc::clone(&kv));

    let err = store
        .save(&NoteInput::new("x".repeat(200), ""), None)
        .unwrap_err();
    assert!(matches!(err, NoteStoreError::Storage(_)));
    assert!(store.notes().is_empty());
}

#[test]
fn malformed_or_absent_payload_loads_as_empty() {
    let kv = Rc::new(MemoryKvRepository::new());
    assert!(LocalNoteStore::open(Rc::clone(&kv)).notes().is_empty());

    kv.seed(NOTES_SLOT_KEY, "{not json");
    let mut store = LocalNoteStore::open(Rc::clone(&kv));
    assert!(store.notes().is_empty());

    store.save(&NoteInput::new("recuperada", ""), None).unwrap();
    assert_eq!(LocalNoteStore::open(kv).notes().len(), 1);
}

#[test]
fn invalid_records_are_skipped_on_load() {
    let kv = Rc::new(MemoryKvRepository::new());
    kv.seed(
        NOTES_SLOT_KEY,
        r#"[
            {"id": "ok", "title": "A", "content": "B",
             "createdAt": "2026-01-01T00:00:00Z", "updatedAt": "2026-01-02T00:00:00Z"},
            {"id": "bad", "title": "C", "content": "D",
             "createdAt": "2026-01-02T00:00:00Z", "updatedAt": "2026-01-01T00:00:00Z"}
        ]"#,
    );

    let store = LocalNoteStore::open(kv);
    assert_eq!(store.notes().len(), 1);
    assert_eq!(store.notes()[0].id.as_str(), "ok");
}

#[test]
fn sqlite_backed_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notas.sqlite3");

    {
        let mut store = LocalNoteStore::open(SqliteKvRepository::open(&path).unwrap());
        store.save(&NoteInput::new("A", "uno"), None).unwrap();
        store.save(&NoteInput::new("B", "dos"), None).unwrap();
    }

    let store = LocalNoteStore::open(SqliteKvRepository::open(&path).unwrap());
    let titles = store
        .notes()
        .iter()
        .map(|note| note.title.as_str())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["B", "A"]);
}
