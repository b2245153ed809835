//! Single-consumer event loop around a [`NotesController`].
//!
//! # Responsibility
//! - Feed UI events, session changes and change-feed items to the
//!   controller one at a time.
//! - Run list fetches and remote searches concurrently so the loop keeps
//!   accepting events while they are in flight.
//! - Fire the draft autosave when its window elapses.
//!
//! # Invariants
//! - Only the loop touches the controller; background tasks send results
//!   back and never mutate state themselves.
//! - Instructions are handed to the renderer after every processed step.

use crate::model::session::SessionEvent;
use crate::remote::gateway::{ChangeFeed, ChangeKind, NoteChange};
use crate::remote::session::SessionListener;
use crate::repo::kv_repo::KvRepository;
use crate::service::notes_controller::{
    AppEvent, CompletedFetch, CompletedSearch, NotesController,
};
use crate::service::view::RenderInstruction;
use log::{debug, error, info, warn};
use std::ops::ControlFlow;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};

enum Completion {
    Fetch(CompletedFetch),
    Search(CompletedSearch),
}

/// Listener that forwards auth changes into the event channel.
pub fn session_event_forwarder(events: UnboundedSender<AppEvent>) -> SessionListener {
    Box::new(move |event: &SessionEvent| {
        if events.send(AppEvent::Session(event.clone())).is_err() {
            debug!("event=session_forward module=event_loop status=skipped reason=loop_closed");
        }
    })
}

/// Forwards change-feed items into the event channel until either side closes.
///
/// A lagged receiver is turned into one synthetic change so the controller
/// still refetches.
pub fn spawn_change_forwarder(
    mut feed: ChangeFeed,
    events: UnboundedSender<AppEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let change = match feed.recv().await {
                Ok(change) => change,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("event=change_forward module=event_loop status=lagged skipped={skipped}");
                    NoteChange::on_notes(ChangeKind::Update, None, None)
                }
                Err(RecvError::Closed) => {
                    info!("event=change_forward module=event_loop status=closed");
                    break;
                }
            };
            if events.send(AppEvent::RemoteChange(change)).is_err() {
                debug!("event=change_forward module=event_loop status=stopped reason=loop_closed");
                break;
            }
        }
    })
}

/// Starts the controller and processes events until `Shutdown` or until
/// every sender is dropped.
pub async fn run_event_loop<K, R>(
    controller: &mut NotesController<K>,
    mut events: UnboundedReceiver<AppEvent>,
    mut render: R,
) where
    K: KvRepository,
    R: FnMut(Vec<RenderInstruction>),
{
    controller.start().await;
    render(controller.take_instructions());

    let mut in_flight: JoinSet<Completion> = JoinSet::new();
    loop {
        let deadline = controller.draft_deadline();
        tokio::select! {
            received = events.recv() => {
                let Some(event) = received else {
                    info!("event=event_loop module=event_loop status=closed");
                    controller.flush_draft();
                    break;
                };
                if handle_event(controller, event, &mut in_flight).await.is_break() {
                    render(controller.take_instructions());
                    break;
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                match joined {
                    Ok(Completion::Fetch(done)) => controller.complete_refresh(done),
                    Ok(Completion::Search(done)) => controller.complete_search(done),
                    Err(err) => error!(
                        "event=event_loop module=event_loop status=error error_code=task_failed error={err}"
                    ),
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                controller.on_draft_deadline();
            }
        }
        render(controller.take_instructions());
    }
    in_flight.abort_all();
    info!("event=event_loop module=event_loop status=stopped");
}

async fn handle_event<K: KvRepository>(
    controller: &mut NotesController<K>,
    event: AppEvent,
    in_flight: &mut JoinSet<Completion>,
) -> ControlFlow<()> {
    match event {
        AppEvent::RemoteChange(change) => {
            if let Some(pending) = controller.begin_change_refresh(&change) {
                in_flight.spawn(async move { Completion::Fetch(pending.run().await) });
            }
            ControlFlow::Continue(())
        }
        AppEvent::Search(query) => {
            if let Some(pending) = controller.begin_search(query) {
                in_flight.spawn(async move { Completion::Search(pending.run().await) });
            }
            ControlFlow::Continue(())
        }
        other => controller.dispatch(other).await,
    }
}

#[cfg(test)]
mod tests {
    use super::{run_event_loop, session_event_forwarder};
    use crate::model::note::NoteInput;
    use crate::model::session::{SessionEvent, UserIdentity};
    use crate::repo::draft_repo::{DraftRepository, DRAFT_SLOT_KEY};
    use crate::repo::kv_repo::{KvRepository, MemoryKvRepository};
    use crate::repo::note_store::LocalNoteStore;
    use crate::service::notes_controller::{AppEvent, NotesController};
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn forwarder_sends_session_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = session_event_forwarder(tx);
        listener(&SessionEvent::signed_in(UserIdentity::new("u1", "a@b.c")));
        assert!(matches!(rx.try_recv(), Ok(AppEvent::Session(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn draft_is_written_after_autosave_window() {
        let kv = Rc::new(MemoryKvRepository::new());
        let mut controller = NotesController::local(
            LocalNoteStore::open(Rc::clone(&kv)),
            DraftRepository::new(Rc::clone(&kv)),
            Duration::from_secs(30),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(AppEvent::FormChanged(NoteInput::new("borrador", "")))
            .unwrap();

        let driver = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            assert!(kv.get(DRAFT_SLOT_KEY).unwrap().is_none());
            tokio::time::sleep(Duration::from_secs(25)).await;
            assert!(kv.get(DRAFT_SLOT_KEY).unwrap().is_some());
            tx.send(AppEvent::Shutdown).unwrap();
        };
        tokio::join!(run_event_loop(&mut controller, rx, |_| {}), driver);
    }
}
