//! Controller-side mirror of the canonical note list.
//!
//! # Invariants
//! - Tickets are issued in strictly increasing order.
//! - A result is applied only if its ticket is newer than every ticket
//!   applied before it and newer than the last `clear()`.

use crate::model::note::{Note, NoteId};

/// Monotonic id attached to one list fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Cached canonical list plus fetch ordering state.
#[derive(Debug, Default)]
pub struct NoteCache {
    notes: Vec<Note>,
    issued: u64,
    applied: u64,
}

impl NoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the ticket for a fetch that is about to start.
    pub fn issue(&mut self) -> FetchTicket {
        self.issued += 1;
        FetchTicket(self.issued)
    }

    /// Whether a newer result (or a clear) already superseded `ticket`.
    pub fn is_stale(&self, ticket: FetchTicket) -> bool {
        ticket.0 <= self.applied
    }

    /// Applies a fetch result. Returns `false` when the result is stale.
    pub fn apply(&mut self, ticket: FetchTicket, notes: Vec<Note>) -> bool {
        if self.is_stale(ticket) {
            return false;
        }
        self.applied = ticket.0;
        self.notes = notes;
        true
    }

    /// Issues and applies in one step, for synchronous sources.
    pub fn replace(&mut self, notes: Vec<Note>) {
        let ticket = self.issue();
        self.apply(ticket, notes);
    }

    /// Empties the cache and invalidates every fetch issued so far.
    pub fn clear(&mut self) {
        self.notes.clear();
        self.applied = self.issued;
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::NoteCache;
    use crate::model::note::{Note, NoteInput};
    use chrono::Utc;

    fn note(title: &str) -> Note {
        Note::new(NoteInput::new(title, "").normalize().unwrap(), None, Utc::now())
    }

    #[test]
    fn older_ticket_cannot_overwrite_newer_result() {
        let mut cache = NoteCache::new();
        let first = cache.issue();
        let second = cache.issue();

        assert!(cache.apply(second, vec![note("new")]));
        assert!(!cache.apply(first, vec![note("old")]));
        assert_eq!(cache.notes()[0].title, "new");
    }

    #[test]
    fn clear_invalidates_in_flight_fetches() {
        let mut cache = NoteCache::new();
        let in_flight = cache.issue();
        cache.clear();

        assert!(!cache.apply(in_flight, vec![note("late")]));
        assert!(cache.is_empty());

        let next = cache.issue();
        assert!(cache.apply(next, vec![note("fresh")]));
        assert_eq!(cache.len(), 1);
    }
}
