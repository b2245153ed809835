//! Debounce window for draft autosave.
//!
//! Every form change pushes the deadline out by the configured delay; the
//! owner polls [`DraftAutosave::take_due`] when the deadline elapses.

use std::time::Duration;
use tokio::time::Instant;

/// Default delay between the last form change and the draft write.
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DraftAutosave {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Default for DraftAutosave {
    fn default() -> Self {
        Self::new(DEFAULT_AUTOSAVE_DELAY)
    }
}

impl DraftAutosave {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restarts the window at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` once per elapsed window and disarms it.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::DraftAutosave;
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn touch_pushes_deadline_and_take_due_fires_once() {
        let mut autosave = DraftAutosave::new(Duration::from_secs(30));
        let start = Instant::now();
        autosave.touch(start);
        autosave.touch(start + Duration::from_secs(10));

        assert!(!autosave.take_due(start + Duration::from_secs(35)));
        assert!(autosave.take_due(start + Duration::from_secs(40)));
        assert!(!autosave.take_due(start + Duration::from_secs(80)));
    }

    #[test]
    fn cancel_disarms_window() {
        let mut autosave = DraftAutosave::default();
        let start = Instant::now();
        autosave.touch(start);
        autosave.cancel();
        assert_eq!(autosave.deadline(), None);
        assert!(!autosave.take_due(start + Duration::from_secs(60)));
    }
}
