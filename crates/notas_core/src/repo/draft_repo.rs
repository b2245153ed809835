//! Draft slot for the in-progress note form.

use crate::model::note::NoteInput;
use crate::repo::kv_repo::KvRepository;
use crate::repo::note_store::StorageError;
use log::{debug, warn};

/// Slot holding the `{title, content}` draft.
pub const DRAFT_SLOT_KEY: &str = "notesAppDraft";

/// Reads and writes the single draft slot.
pub struct DraftRepository<K: KvRepository> {
    kv: K,
}

impl<K: KvRepository> DraftRepository<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Returns the stored draft, or `None` when absent, blank or unreadable.
    pub fn load(&self) -> Option<NoteInput> {
        let raw = match self.kv.get(DRAFT_SLOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("event=draft_load module=draft status=error error={err}");
                return None;
            }
        };

        match serde_json::from_str::<NoteInput>(&raw) {
            Ok(draft) if !draft.is_blank() => Some(draft),
            Ok(_) => None,
            Err(err) => {
                warn!("event=draft_load module=draft status=error error_code=malformed_payload error={err}");
                None
            }
        }
    }

    /// Stores the draft verbatim (untrimmed).
    pub fn save(&self, draft: &NoteInput) -> Result<(), StorageError> {
        let payload = serde_json::to_string(draft)?;
        self.kv.set(DRAFT_SLOT_KEY, &payload)?;
        debug!("event=draft_save module=draft status=ok");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.kv.remove(DRAFT_SLOT_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DraftRepository, DRAFT_SLOT_KEY};
    use crate::model::note::NoteInput;
    use crate::repo::kv_repo::MemoryKvRepository;

    #[test]
    fn save_load_and_clear_draft() {
        let drafts = DraftRepository::new(MemoryKvRepository::new());
        assert!(drafts.load().is_none());

        drafts.save(&NoteInput::new("half", " written ")).unwrap();
        assert_eq!(drafts.load(), Some(NoteInput::new("half", " written ")));

        drafts.clear().unwrap();
        assert!(drafts.load().is_none());
    }

    #[test]
    fn load_tolerates_partial_and_malformed_payloads() {
        let kv = MemoryKvRepository::new();
        kv.seed(DRAFT_SLOT_KEY, r#"{"title":"only title"}"#);
        let drafts = DraftRepository::new(kv);
        assert_eq!(drafts.load(), Some(NoteInput::new("only title", "")));

        let kv = MemoryKvRepository::new();
        kv.seed(DRAFT_SLOT_KEY, "{not json");
        assert!(DraftRepository::new(kv).load().is_none());
    }
}
