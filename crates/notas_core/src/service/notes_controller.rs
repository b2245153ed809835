//! Notes controller.
//!
//! # Responsibility
//! - Own the session snapshot, the canonical note cache, the form and the
//!   edit target.
//! - Route every user action to the local store or the remote gateway and
//!   reconcile the rendered list afterwards.
//! - Translate every failure into a user-visible notification.
//!
//! # Invariants
//! - Handlers never return errors; UI effects are queued as
//!   [`RenderInstruction`]s and drained with `take_instructions`.
//! - In remote mode no write reaches the gateway without a session.
//! - Search never mutates the canonical cache.
//! - Fetch and search results older than the newest applied one are
//!   discarded.
//!
//! # See also
//! - `service::event_loop` for the task that feeds events in.

use crate::model::note::{filter_notes, Note, NoteId, NoteInput};
use crate::model::session::{Session, SessionEvent, SessionEventKind, UserIdentity};
use crate::remote::gateway::{NoteChange, RemoteError, RemoteNoteGateway, RemoteResult};
use crate::remote::session::{AuthProvider, Credentials, SessionManager, SignUpOutcome};
use crate::repo::draft_repo::DraftRepository;
use crate::repo::kv_repo::KvRepository;
use crate::repo::note_store::{LocalNoteStore, StorageError};
use crate::service::cache::{FetchTicket, NoteCache};
use crate::service::draft::DraftAutosave;
use crate::service::error::{AppError, ErrorKind};
use crate::service::transfer::{
    build_export, check_import_file_name, materialize_local, parse_import_payload,
    ImportCandidate, ImportError, ImportMode,
};
use crate::service::view::{
    ConfirmationToken, EmptyState, Notification, NotificationLevel, NotesView, RenderInstruction,
};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MSG_EMPTY_NOTE: &str = "Por favor, escribe al menos un título o contenido";
const MSG_NOTE_SAVED: &str = "Nota guardada correctamente";
const MSG_NOTE_UPDATED: &str = "Nota actualizada correctamente";
const MSG_NOTE_DELETED: &str = "Nota eliminada correctamente";
const MSG_SAVE_FAILED: &str = "Error al guardar la nota";
const MSG_PERSIST_FAILED: &str = "Error al guardar las notas";
const MSG_DELETE_FAILED: &str = "Error al eliminar la nota";
const MSG_LOAD_FAILED: &str = "Error al cargar las notas";
const MSG_SEARCH_FAILED: &str = "Error al buscar notas";
const MSG_SAVE_AUTH: &str = "Debes iniciar sesión para guardar notas";
const MSG_DELETE_AUTH: &str = "Debes iniciar sesión para eliminar notas";
const MSG_EXPORT_AUTH: &str = "Debes iniciar sesión para exportar notas";
const MSG_IMPORT_AUTH: &str = "Debes iniciar sesión para importar notas";
const MSG_NOTHING_TO_EXPORT: &str = "No hay notas para exportar";
const MSG_EXPORTED: &str = "Notas exportadas correctamente";
const MSG_EXPORT_FAILED: &str = "Error al exportar las notas";
const MSG_NOT_JSON: &str = "Por favor selecciona un archivo JSON válido";
const MSG_NO_VALID_NOTES: &str = "El archivo no contiene notas válidas";
const MSG_IMPORT_INVALID: &str = "Error al importar las notas. Verifica que el archivo sea válido.";
const MSG_IMPORT_FAILED: &str = "Error al importar las notas";
const MSG_MISSING_CREDENTIALS: &str = "Por favor completa todos los campos";
const MSG_AUTH_FAILED: &str = "Error en la autenticación";
const MSG_AUTH_UNAVAILABLE: &str = "La autenticación no está disponible en modo local";
const MSG_SIGNED_IN: &str = "Sesión iniciada correctamente";
const MSG_SIGNED_UP: &str = "Cuenta creada correctamente";
const MSG_SIGNED_UP_CONFIRM: &str = "Cuenta creada correctamente. Revisa tu email para confirmar.";
const MSG_SIGNED_OUT: &str = "Sesión cerrada correctamente";
const MSG_SIGN_OUT_FAILED: &str = "Error al cerrar sesión";

/// Hosted collaborators used in remote mode.
#[derive(Clone)]
pub struct RemoteServices {
    pub gateway: Arc<dyn RemoteNoteGateway>,
    pub session: Arc<dyn SessionManager>,
}

impl RemoteServices {
    pub fn new(gateway: Arc<dyn RemoteNoteGateway>, session: Arc<dyn SessionManager>) -> Self {
        Self { gateway, session }
    }
}

/// Authority for the canonical list. The two modes are mutually exclusive.
pub enum NoteSource<K: KvRepository> {
    Local(LocalNoteStore<K>),
    Remote(RemoteServices),
}

/// Coarse controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Remote mode without a session; notes are hidden.
    Unauthenticated,
    AuthenticatedEmpty,
    AuthenticatedPopulated,
}

/// Keyboard accelerators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Save,
    /// Closes pending dialogs and clears the form.
    ClearForm,
    FocusSearch,
}

/// Every input the controller reacts to.
#[derive(Debug, Clone)]
pub enum AppEvent {
    FormChanged(NoteInput),
    SaveForm,
    Edit(NoteId),
    ClearForm,
    RequestDelete(NoteId),
    ConfirmDelete(ConfirmationToken),
    CancelDelete(ConfirmationToken),
    Search(String),
    Export,
    Import { file_name: String, contents: String },
    /// `mode: None` cancels the pending import.
    ResolveImport {
        token: ConfirmationToken,
        mode: Option<ImportMode>,
    },
    SignIn(Credentials),
    SignUp(Credentials),
    SignInWithProvider(AuthProvider),
    SignOut,
    Session(SessionEvent),
    RemoteChange(NoteChange),
    Shortcut(Shortcut),
    /// Draft autosave window elapsed.
    DraftDue,
    Shutdown,
}

/// List fetch that has been ticketed but not yet sent.
pub struct PendingFetch {
    ticket: FetchTicket,
    owner: UserIdentity,
    gateway: Arc<dyn RemoteNoteGateway>,
}

impl PendingFetch {
    pub fn ticket(&self) -> FetchTicket {
        self.ticket
    }

    pub async fn run(self) -> CompletedFetch {
        let result = self.gateway.list_notes(&self.owner).await;
        CompletedFetch {
            ticket: self.ticket,
            owner: self.owner,
            result,
        }
    }
}

/// Gateway answer waiting to be applied by [`NotesController::complete_refresh`].
pub struct CompletedFetch {
    ticket: FetchTicket,
    owner: UserIdentity,
    result: RemoteResult<Vec<Note>>,
}

pub struct PendingSearch {
    seq: u64,
    query: String,
    owner: UserIdentity,
    gateway: Arc<dyn RemoteNoteGateway>,
}

impl PendingSearch {
    pub async fn run(self) -> CompletedSearch {
        let result = self.gateway.search_notes(&self.owner, &self.query).await;
        CompletedSearch {
            seq: self.seq,
            owner: self.owner,
            result,
        }
    }
}

pub struct CompletedSearch {
    seq: u64,
    owner: UserIdentity,
    result: RemoteResult<Vec<Note>>,
}

struct PendingImport {
    token: ConfirmationToken,
    candidates: Vec<ImportCandidate>,
}

/// Orchestrates store/gateway, session and view for one UI.
pub struct NotesController<K: KvRepository> {
    source: NoteSource<K>,
    drafts: DraftRepository<K>,
    autosave: DraftAutosave,
    cache: NoteCache,
    session: Session,
    form: NoteInput,
    editing: Option<NoteId>,
    query: String,
    search_results: Option<Vec<Note>>,
    search_seq: u64,
    pending_delete: Option<(ConfirmationToken, NoteId)>,
    pending_import: Option<PendingImport>,
    last_token: u64,
    last_view: Option<NotesView>,
    outbox: Vec<RenderInstruction>,
}

impl<K: KvRepository> NotesController<K> {
    pub fn new(
        source: NoteSource<K>,
        drafts: DraftRepository<K>,
        autosave_delay: Duration,
    ) -> Self {
        Self {
            source,
            drafts,
            autosave: DraftAutosave::new(autosave_delay),
            cache: NoteCache::new(),
            session: Session::anonymous(),
            form: NoteInput::default(),
            editing: None,
            query: String::new(),
            search_results: None,
            search_seq: 0,
            pending_delete: None,
            pending_import: None,
            last_token: 0,
            last_view: None,
            outbox: Vec::new(),
        }
    }

    /// Controller over the local slot store.
    pub fn local(
        store: LocalNoteStore<K>,
        drafts: DraftRepository<K>,
        autosave_delay: Duration,
    ) -> Self {
        Self::new(NoteSource::Local(store), drafts, autosave_delay)
    }

    /// Controller over the hosted backend.
    pub fn remote(
        services: RemoteServices,
        drafts: DraftRepository<K>,
        autosave_delay: Duration,
    ) -> Self {
        Self::new(NoteSource::Remote(services), drafts, autosave_delay)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.source, NoteSource::Remote(_))
    }

    pub fn state(&self) -> ControllerState {
        if self.is_locked() {
            ControllerState::Unauthenticated
        } else if self.cache.is_empty() {
            ControllerState::AuthenticatedEmpty
        } else {
            ControllerState::AuthenticatedPopulated
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Cached canonical list, unaffected by search.
    pub fn notes(&self) -> &[Note] {
        self.cache.notes()
    }

    /// Notes currently shown: canonical list or search results.
    pub fn visible_notes(&self) -> Vec<Note> {
        if self.is_locked() {
            return Vec::new();
        }
        if self.query.trim().is_empty() {
            return self.cache.notes().to_vec();
        }
        match &self.search_results {
            Some(results) => results.clone(),
            None => filter_notes(self.cache.notes(), &self.query),
        }
    }

    pub fn editing(&self) -> Option<&NoteId> {
        self.editing.as_ref()
    }

    pub fn form(&self) -> &NoteInput {
        &self.form
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// When the pending draft autosave is due, if any.
    pub fn draft_deadline(&self) -> Option<Instant> {
        self.autosave.deadline()
    }

    /// Drains queued UI instructions in emission order.
    pub fn take_instructions(&mut self) -> Vec<RenderInstruction> {
        std::mem::take(&mut self.outbox)
    }

    /// Loads the initial list (local) or resolves the session (remote),
    /// then restores any saved draft.
    pub async fn start(&mut self) {
        info!(
            "event=controller_start module=controller status=start mode={}",
            self.mode_name()
        );
        match self.session_manager() {
            None => {
                if let NoteSource::Local(store) = &mut self.source {
                    let notes = store.load().to_vec();
                    self.cache.replace(notes);
                }
            }
            Some(sessions) => match sessions.current_identity().await {
                Ok(Some(identity)) => self.enter_authenticated(identity).await,
                Ok(None) => self.enter_unauthenticated(),
                Err(err) => {
                    error!(
                        "event=session_resolve module=controller status=error error_code={} error={err}",
                        err.code()
                    );
                    self.enter_unauthenticated();
                }
            },
        }

        if let Some(draft) = self.drafts.load() {
            self.outbox.push(RenderInstruction::FillForm {
                title: draft.title.clone(),
                content: draft.content.clone(),
            });
            self.form = draft;
        }
        self.render();
        info!(
            "event=controller_start module=controller status=ok mode={} count={}",
            self.mode_name(),
            self.cache.len()
        );
    }

    /// Routes one event to its handler.
    pub async fn dispatch(&mut self, event: AppEvent) -> ControlFlow<()> {
        match event {
            AppEvent::FormChanged(input) => self.form_changed(input),
            AppEvent::SaveForm => self.save_form().await,
            AppEvent::Edit(id) => self.edit(&id),
            AppEvent::ClearForm => self.clear_form(),
            AppEvent::RequestDelete(id) => {
                self.request_delete(&id);
            }
            AppEvent::ConfirmDelete(token) => self.confirm_delete(token).await,
            AppEvent::CancelDelete(token) => self.cancel_delete(token),
            AppEvent::Search(query) => self.search(query).await,
            AppEvent::Export => self.export(),
            AppEvent::Import {
                file_name,
                contents,
            } => {
                self.begin_import(&file_name, &contents);
            }
            AppEvent::ResolveImport { token, mode } => self.resolve_import(token, mode).await,
            AppEvent::SignIn(credentials) => self.sign_in(&credentials).await,
            AppEvent::SignUp(credentials) => self.sign_up(&credentials).await,
            AppEvent::SignInWithProvider(provider) => self.sign_in_with_provider(provider).await,
            AppEvent::SignOut => self.sign_out().await,
            AppEvent::Session(event) => self.handle_session_event(event).await,
            AppEvent::RemoteChange(change) => self.handle_remote_change(&change).await,
            AppEvent::Shortcut(shortcut) => self.handle_shortcut(shortcut).await,
            AppEvent::DraftDue => self.on_draft_deadline(),
            AppEvent::Shutdown => {
                self.flush_draft();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Records the latest form contents and restarts the autosave window.
    pub fn form_changed(&mut self, input: NoteInput) {
        self.form = input;
        self.autosave.touch(Instant::now());
    }

    /// Writes the draft if the autosave window has elapsed.
    pub fn on_draft_deadline(&mut self) {
        if self.autosave.take_due(Instant::now()) {
            self.write_draft();
        }
    }

    /// Writes a pending draft immediately.
    pub fn flush_draft(&mut self) {
        if self.autosave.deadline().is_some() {
            self.autosave.cancel();
            self.write_draft();
        }
    }

    /// Replaces the form contents and saves them.
    pub async fn save(&mut self, input: NoteInput) {
        self.form = input;
        self.save_form().await;
    }

    /// Saves the current form as a new note or as an edit of the target.
    pub async fn save_form(&mut self) {
        let input = self.form.clone();
        let editing = self.editing.clone();
        if self.is_remote() {
            self.save_remote(&input, editing).await;
        } else {
            self.save_local(&input, editing);
        }
    }

    /// Loads one note into the form and marks it as the edit target.
    pub fn edit(&mut self, id: &NoteId) {
        let Some(note) = self.cache.get(id) else {
            warn!("event=note_edit module=controller status=skipped reason=not_found note_id={id}");
            return;
        };
        let (title, content) = (note.title.clone(), note.content.clone());
        self.form = NoteInput::new(title.clone(), content.clone());
        self.editing = Some(id.clone());
        self.outbox
            .push(RenderInstruction::FillForm { title, content });
        self.outbox.push(RenderInstruction::FocusTitle);
        self.render();
    }

    /// Clears the form and the edit target.
    pub fn clear_form(&mut self) {
        self.reset_form();
        self.render();
    }

    /// First step of a delete: emits a confirmation request.
    ///
    /// Returns `None` when the note is unknown or the session is missing.
    pub fn request_delete(&mut self, id: &NoteId) -> Option<ConfirmationToken> {
        if self.is_locked() {
            self.report("note_delete", AppError::AuthRequired, MSG_DELETE_AUTH);
            return None;
        }
        let Some(note) = self.cache.get(id) else {
            warn!("event=note_delete module=controller status=skipped reason=not_found note_id={id}");
            return None;
        };
        let title = note.title.clone();
        let token = self.next_token();
        self.pending_delete = Some((token, id.clone()));
        self.outbox
            .push(RenderInstruction::ConfirmDelete { token, title });
        Some(token)
    }

    /// Second step of a delete. Unknown or superseded tokens are ignored.
    pub async fn confirm_delete(&mut self, token: ConfirmationToken) {
        let id = match self.pending_delete.take() {
            Some((pending, id)) if pending == token => id,
            other => {
                self.pending_delete = other;
                debug!(
                    "event=note_delete module=controller status=skipped reason=unknown_token token={}",
                    token.value()
                );
                return;
            }
        };
        if self.is_remote() {
            self.delete_remote(&id).await;
        } else {
            self.delete_local(&id);
        }
    }

    pub fn cancel_delete(&mut self, token: ConfirmationToken) {
        if matches!(self.pending_delete, Some((pending, _)) if pending == token) {
            self.pending_delete = None;
            debug!(
                "event=note_delete module=controller status=cancelled token={}",
                token.value()
            );
        }
    }

    /// Filters the rendered list without touching the canonical cache.
    pub async fn search(&mut self, query: impl Into<String>) {
        if let Some(pending) = self.begin_search(query) {
            let done = pending.run().await;
            self.complete_search(done);
        }
    }

    /// Applies a query locally and, in remote mode, returns the server-side
    /// search to run.
    pub fn begin_search(&mut self, query: impl Into<String>) -> Option<PendingSearch> {
        self.query = query.into();
        self.search_results = None;
        self.search_seq += 1;

        let pending = match (&self.source, &self.session.identity) {
            (NoteSource::Remote(services), Some(owner)) if !self.query.trim().is_empty() => {
                Some(PendingSearch {
                    seq: self.search_seq,
                    query: self.query.clone(),
                    owner: owner.clone(),
                    gateway: Arc::clone(&services.gateway),
                })
            }
            _ => None,
        };
        self.render();
        pending
    }

    /// Applies a server-side search result unless a newer query superseded it.
    pub fn complete_search(&mut self, done: CompletedSearch) {
        if done.seq != self.search_seq || self.session.identity.as_ref() != Some(&done.owner) {
            debug!(
                "event=notes_search module=controller status=skipped reason=stale seq={}",
                done.seq
            );
            return;
        }
        match done.result {
            Ok(notes) => {
                let notes = retain_owned(notes, &done.owner);
                debug!(
                    "event=notes_search module=controller status=ok count={}",
                    notes.len()
                );
                self.search_results = Some(notes);
                self.render();
            }
            Err(err) => self.report("notes_search", err.into(), MSG_SEARCH_FAILED),
        }
    }

    /// Offers the canonical list as a JSON backup download.
    pub fn export(&mut self) {
        if self.is_locked() {
            self.report("notes_export", AppError::AuthRequired, MSG_EXPORT_AUTH);
            return;
        }
        if self.cache.is_empty() {
            self.notify(NotificationLevel::Warning, MSG_NOTHING_TO_EXPORT);
            return;
        }
        match build_export(self.cache.notes(), Utc::now()) {
            Ok(snapshot) => {
                info!(
                    "event=notes_export module=controller status=ok count={}",
                    snapshot.note_count
                );
                self.outbox.push(RenderInstruction::OfferDownload(snapshot));
                self.notify(NotificationLevel::Success, MSG_EXPORTED);
            }
            Err(err) => self.report(
                "notes_export",
                AppError::Storage(StorageError::Encode(err)),
                MSG_EXPORT_FAILED,
            ),
        }
    }

    /// Validates an import file and asks replace-or-append.
    pub fn begin_import(&mut self, file_name: &str, contents: &str) -> Option<ConfirmationToken> {
        if self.is_locked() {
            self.report("notes_import", AppError::AuthRequired, MSG_IMPORT_AUTH);
            return None;
        }
        let parsed = check_import_file_name(file_name).and_then(|()| parse_import_payload(contents));
        let candidates = match parsed {
            Ok(candidates) => candidates,
            Err(err) => {
                let message = match err {
                    ImportError::NotJsonFile(_) => MSG_NOT_JSON,
                    ImportError::NoValidNotes => MSG_NO_VALID_NOTES,
                    ImportError::Malformed(_) | ImportError::NotAnArray => MSG_IMPORT_INVALID,
                };
                self.report("notes_import", err.into(), message);
                return None;
            }
        };

        let token = self.next_token();
        let count = candidates.len();
        self.pending_import = Some(PendingImport { token, candidates });
        info!("event=notes_import module=controller status=pending count={count}");
        self.outbox
            .push(RenderInstruction::ConfirmImport { token, count });
        Some(token)
    }

    /// Applies (or with `None`, cancels) the pending import.
    pub async fn resolve_import(&mut self, token: ConfirmationToken, mode: Option<ImportMode>) {
        let candidates = match self.pending_import.take() {
            Some(pending) if pending.token == token => pending.candidates,
            other => {
                self.pending_import = other;
                debug!(
                    "event=notes_import module=controller status=skipped reason=unknown_token token={}",
                    token.value()
                );
                return;
            }
        };
        let Some(mode) = mode else {
            info!("event=notes_import module=controller status=cancelled");
            return;
        };
        if self.is_remote() {
            self.import_remote(candidates, mode).await;
        } else {
            self.import_local(candidates, mode);
        }
    }

    pub async fn sign_in(&mut self, credentials: &Credentials) {
        let Some(sessions) = self.require_session_manager("sign_in") else {
            return;
        };
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            self.report("sign_in", AppError::MissingCredentials, MSG_MISSING_CREDENTIALS);
            return;
        }
        match sessions.sign_in(credentials).await {
            Ok(_) => {
                info!("event=sign_in module=controller status=ok");
                self.outbox.push(RenderInstruction::DismissAuthDialog);
                self.notify(NotificationLevel::Success, MSG_SIGNED_IN);
            }
            Err(err) => {
                let message = auth_failure_message(&err, MSG_AUTH_FAILED);
                self.report("sign_in", err.into(), message);
            }
        }
    }

    pub async fn sign_up(&mut self, credentials: &Credentials) {
        let Some(sessions) = self.require_session_manager("sign_up") else {
            return;
        };
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            self.report("sign_up", AppError::MissingCredentials, MSG_MISSING_CREDENTIALS);
            return;
        }
        match sessions.sign_up(credentials).await {
            Ok(outcome) => {
                info!("event=sign_up module=controller status=ok outcome={outcome:?}");
                self.outbox.push(RenderInstruction::DismissAuthDialog);
                let message = match outcome {
                    SignUpOutcome::SignedIn => MSG_SIGNED_UP,
                    SignUpOutcome::ConfirmationRequired => MSG_SIGNED_UP_CONFIRM,
                };
                self.notify(NotificationLevel::Success, message);
            }
            Err(err) => {
                let message = auth_failure_message(&err, MSG_AUTH_FAILED);
                self.report("sign_up", err.into(), message);
            }
        }
    }

    pub async fn sign_in_with_provider(&mut self, provider: AuthProvider) {
        let Some(sessions) = self.require_session_manager("sign_in_provider") else {
            return;
        };
        match sessions.sign_in_with_provider(provider).await {
            Ok(()) => info!(
                "event=sign_in_provider module=controller status=ok provider={}",
                provider.as_str()
            ),
            Err(err) => self.report(
                "sign_in_provider",
                err.into(),
                format!("Error al iniciar sesión con {}", provider.display_name()),
            ),
        }
    }

    pub async fn sign_out(&mut self) {
        let Some(sessions) = self.require_session_manager("sign_out") else {
            return;
        };
        match sessions.sign_out().await {
            Ok(()) => {
                info!("event=sign_out module=controller status=ok");
                self.notify(NotificationLevel::Info, MSG_SIGNED_OUT);
            }
            Err(err) => self.report("sign_out", err.into(), MSG_SIGN_OUT_FAILED),
        }
    }

    /// Applies an auth state change; the only way the session changes.
    pub async fn handle_session_event(&mut self, event: SessionEvent) {
        if !self.is_remote() {
            debug!(
                "event=session_change module=controller status=skipped reason=local_mode kind={}",
                event.kind.as_str()
            );
            return;
        }
        info!(
            "event=session_change module=controller status=ok kind={}",
            event.kind.as_str()
        );
        match event.session.identity {
            Some(identity) if event.kind != SessionEventKind::SignedOut => {
                self.enter_authenticated(identity).await;
            }
            _ => self.enter_unauthenticated(),
        }
    }

    /// Refetches after any change on the notes table.
    pub async fn handle_remote_change(&mut self, change: &NoteChange) {
        if let Some(pending) = self.begin_change_refresh(change) {
            let done = pending.run().await;
            self.complete_refresh(done);
        }
    }

    /// Ticketed refetch for a change-feed item, if one is needed.
    pub fn begin_change_refresh(&mut self, change: &NoteChange) -> Option<PendingFetch> {
        if !self.is_remote() || !change.concerns_notes_table() {
            return None;
        }
        debug!(
            "event=remote_change module=controller status=ok kind={:?}",
            change.kind
        );
        self.begin_refresh()
    }

    /// Reconciles the cache with the canonical source and re-renders.
    pub async fn refresh(&mut self) {
        match self.begin_refresh() {
            Some(pending) => {
                let done = pending.run().await;
                self.complete_refresh(done);
            }
            None => self.render(),
        }
    }

    /// Local mode: syncs the cache immediately and returns `None`.
    /// Remote mode: returns a ticketed fetch, or `None` without a session.
    pub fn begin_refresh(&mut self) -> Option<PendingFetch> {
        match &self.source {
            NoteSource::Local(store) => {
                let notes = store.notes().to_vec();
                self.cache.replace(notes);
                None
            }
            NoteSource::Remote(services) => {
                let owner = self.session.identity.clone()?;
                let gateway = Arc::clone(&services.gateway);
                let ticket = self.cache.issue();
                debug!(
                    "event=notes_fetch module=controller status=start ticket={}",
                    ticket.value()
                );
                Some(PendingFetch {
                    ticket,
                    owner,
                    gateway,
                })
            }
        }
    }

    /// Applies a fetch result unless it is stale or belongs to an old session.
    pub fn complete_refresh(&mut self, done: CompletedFetch) {
        let CompletedFetch {
            ticket,
            owner,
            result,
        } = done;
        if self.session.identity.as_ref() != Some(&owner) || self.cache.is_stale(ticket) {
            debug!(
                "event=notes_fetch module=controller status=skipped reason=stale ticket={}",
                ticket.value()
            );
            return;
        }
        match result {
            Ok(notes) => {
                let notes = retain_owned(notes, &owner);
                let count = notes.len();
                self.cache.apply(ticket, notes);
                self.search_results = None;
                info!(
                    "event=notes_fetch module=controller status=ok ticket={} count={count}",
                    ticket.value()
                );
                self.drop_missing_edit_target();
                self.render();
            }
            Err(err) => self.report("notes_fetch", err.into(), MSG_LOAD_FAILED),
        }
    }

    async fn handle_shortcut(&mut self, shortcut: Shortcut) {
        match shortcut {
            Shortcut::Save => self.save_form().await,
            Shortcut::ClearForm => {
                self.pending_delete = None;
                self.pending_import = None;
                self.clear_form();
            }
            Shortcut::FocusSearch => self.outbox.push(RenderInstruction::FocusSearch),
        }
    }

    fn save_local(&mut self, input: &NoteInput, editing: Option<NoteId>) {
        let NoteSource::Local(store) = &mut self.source else {
            return;
        };
        let was_edit = editing.as_ref().is_some_and(|id| store.get(id).is_some());
        match store.save(input, editing.as_ref()) {
            Ok(_) => {
                let notes = store.notes().to_vec();
                self.cache.replace(notes);
                self.finish_save(was_edit);
            }
            Err(err) => {
                let err = AppError::from(err);
                let message = match err.kind() {
                    ErrorKind::Validation => MSG_EMPTY_NOTE,
                    _ => MSG_PERSIST_FAILED,
                };
                self.report("note_save", err, message);
            }
        }
    }

    async fn save_remote(&mut self, input: &NoteInput, editing: Option<NoteId>) {
        let Some(gateway) = self.remote_gateway() else {
            return;
        };
        let Some(owner) = self.session.identity.clone() else {
            self.report("note_save", AppError::AuthRequired, MSG_SAVE_AUTH);
            return;
        };
        let body = match input.normalize() {
            Ok(body) => body,
            Err(err) => {
                self.report("note_save", err.into(), MSG_EMPTY_NOTE);
                return;
            }
        };

        let result = match editing.as_ref() {
            Some(id) => gateway.update_note(&owner, id, &body).await,
            None => gateway.create_note(&owner, &body).await,
        };
        match result {
            Ok(note) => {
                info!(
                    "event=note_save module=controller status=ok mode={} note_id={}",
                    if editing.is_some() { "update" } else { "create" },
                    note.id
                );
                self.refresh().await;
                self.finish_save(editing.is_some());
            }
            Err(err) => self.report("note_save", err.into(), MSG_SAVE_FAILED),
        }
    }

    fn finish_save(&mut self, was_edit: bool) {
        self.reset_form();
        if let Err(err) = self.drafts.clear() {
            warn!("event=draft_clear module=controller status=error error={err}");
        }
        let message = if was_edit {
            MSG_NOTE_UPDATED
        } else {
            MSG_NOTE_SAVED
        };
        self.notify(NotificationLevel::Success, message);
        self.render();
    }

    fn delete_local(&mut self, id: &NoteId) {
        let NoteSource::Local(store) = &mut self.source else {
            return;
        };
        match store.delete(id) {
            Ok(removed) => {
                let notes = store.notes().to_vec();
                self.cache.replace(notes);
                if removed {
                    self.after_delete(id);
                } else {
                    debug!("event=note_delete module=controller status=skipped reason=absent note_id={id}");
                }
                self.render();
            }
            Err(err) => self.report("note_delete", err.into(), MSG_PERSIST_FAILED),
        }
    }

    async fn delete_remote(&mut self, id: &NoteId) {
        let Some(gateway) = self.remote_gateway() else {
            return;
        };
        let Some(owner) = self.session.identity.clone() else {
            self.report("note_delete", AppError::AuthRequired, MSG_DELETE_AUTH);
            return;
        };
        match gateway.delete_note(&owner, id).await {
            Ok(()) => {
                self.after_delete(id);
                self.refresh().await;
            }
            Err(err) => self.report("note_delete", err.into(), MSG_DELETE_FAILED),
        }
    }

    fn after_delete(&mut self, id: &NoteId) {
        info!("event=note_delete module=controller status=ok note_id={id}");
        if self.editing.as_ref() == Some(id) {
            self.reset_form();
        }
        self.notify(NotificationLevel::Info, MSG_NOTE_DELETED);
    }

    fn import_local(&mut self, candidates: Vec<ImportCandidate>, mode: ImportMode) {
        let NoteSource::Local(store) = &mut self.source else {
            return;
        };
        let now = Utc::now();
        let result = match mode {
            ImportMode::Replace => {
                let notes = materialize_local(candidates, &[], now);
                let count = notes.len();
                store.replace_all(notes).map(|()| count)
            }
            ImportMode::Append => {
                let notes = materialize_local(candidates, store.notes(), now);
                let count = notes.len();
                store.append(notes).map(|()| count)
            }
        };
        let notes = store.notes().to_vec();
        self.cache.replace(notes);
        match result {
            Ok(count) => self.finish_import(count, mode),
            Err(err) => self.report("notes_import", err.into(), MSG_IMPORT_FAILED),
        }
    }

    async fn import_remote(&mut self, candidates: Vec<ImportCandidate>, mode: ImportMode) {
        let Some(gateway) = self.remote_gateway() else {
            return;
        };
        let Some(owner) = self.session.identity.clone() else {
            self.report("notes_import", AppError::AuthRequired, MSG_IMPORT_AUTH);
            return;
        };

        if let Err(err) = replace_remote_notes(gateway.as_ref(), &owner, mode).await {
            self.report("notes_import", err.into(), MSG_IMPORT_FAILED);
            self.refresh().await;
            return;
        }

        let mut imported = 0usize;
        let mut failure = None;
        // Oldest first so the gateway's newest-first order matches the file.
        for candidate in candidates.into_iter().rev() {
            let Ok(body) = candidate.input.normalize() else {
                continue;
            };
            match gateway.create_note(&owner, &body).await {
                Ok(_) => imported += 1,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        self.refresh().await;
        match failure {
            None => self.finish_import(imported, mode),
            Some(err) => {
                warn!("event=notes_import module=controller status=partial imported={imported}");
                self.report("notes_import", err.into(), MSG_IMPORT_FAILED);
            }
        }
    }

    fn finish_import(&mut self, count: usize, mode: ImportMode) {
        info!("event=notes_import module=controller status=ok mode={mode:?} count={count}");
        self.drop_missing_edit_target();
        self.notify(
            NotificationLevel::Success,
            format!("{count} notas importadas correctamente"),
        );
        self.render();
    }

    async fn enter_authenticated(&mut self, identity: UserIdentity) {
        if self.session.identity.as_ref() != Some(&identity) {
            if self.session.is_authenticated() {
                self.cache.clear();
            }
            self.outbox.push(RenderInstruction::ShowSignedIn {
                email: identity.email.clone(),
            });
            self.outbox.push(RenderInstruction::DismissAuthDialog);
            self.session = Session::authenticated(identity);
        }
        self.refresh().await;
    }

    fn enter_unauthenticated(&mut self) {
        self.session = Session::anonymous();
        self.cache.clear();
        self.search_results = None;
        self.pending_delete = None;
        self.pending_import = None;
        self.editing = None;
        self.outbox.push(RenderInstruction::ShowSignedOut);
        self.render();
    }

    fn write_draft(&mut self) {
        if self.form.is_blank() {
            return;
        }
        match self.drafts.save(&self.form) {
            Ok(()) => debug!("event=draft_save module=controller status=ok"),
            Err(err) => warn!("event=draft_save module=controller status=error error={err}"),
        }
    }

    fn reset_form(&mut self) {
        self.form = NoteInput::default();
        self.editing = None;
        self.autosave.cancel();
        self.outbox.push(RenderInstruction::ClearForm);
    }

    fn drop_missing_edit_target(&mut self) {
        if let Some(id) = &self.editing {
            if self.cache.get(id).is_none() {
                debug!("event=note_edit module=controller status=cleared reason=target_gone note_id={id}");
                self.editing = None;
            }
        }
    }

    fn render(&mut self) {
        let view = if self.is_locked() {
            NotesView::locked()
        } else {
            NotesView::build(
                &self.visible_notes(),
                self.editing.as_ref(),
                EmptyState::NoNotes,
                Utc::now(),
            )
        };
        if self.last_view.as_ref() == Some(&view) {
            return;
        }
        self.last_view = Some(view.clone());
        self.outbox.push(RenderInstruction::RenderNotes(view));
    }

    fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.outbox
            .push(RenderInstruction::Notify(Notification::new(level, message)));
    }

    fn report(&mut self, event: &str, err: AppError, message: impl Into<String>) {
        let kind = err.kind();
        match kind.level() {
            NotificationLevel::Error => error!(
                "event={event} module=controller status=error error_kind={} error_code={} error={err}",
                kind.as_str(),
                err.code()
            ),
            _ => warn!(
                "event={event} module=controller status=rejected error_kind={} error_code={}",
                kind.as_str(),
                err.code()
            ),
        }
        self.outbox
            .push(RenderInstruction::Notify(Notification::failure(kind, message)));
    }

    fn is_locked(&self) -> bool {
        self.is_remote() && !self.session.is_authenticated()
    }

    fn mode_name(&self) -> &'static str {
        if self.is_remote() {
            "remote"
        } else {
            "local"
        }
    }

    fn next_token(&mut self) -> ConfirmationToken {
        self.last_token += 1;
        ConfirmationToken::new(self.last_token)
    }

    fn remote_gateway(&self) -> Option<Arc<dyn RemoteNoteGateway>> {
        match &self.source {
            NoteSource::Remote(services) => Some(Arc::clone(&services.gateway)),
            NoteSource::Local(_) => None,
        }
    }

    fn session_manager(&self) -> Option<Arc<dyn SessionManager>> {
        match &self.source {
            NoteSource::Remote(services) => Some(Arc::clone(&services.session)),
            NoteSource::Local(_) => None,
        }
    }

    fn require_session_manager(&mut self, event: &str) -> Option<Arc<dyn SessionManager>> {
        let sessions = self.session_manager();
        if sessions.is_none() {
            self.report(
                event,
                AppError::Unavailable("authentication"),
                MSG_AUTH_UNAVAILABLE,
            );
        }
        sessions
    }
}

async fn replace_remote_notes(
    gateway: &dyn RemoteNoteGateway,
    owner: &UserIdentity,
    mode: ImportMode,
) -> RemoteResult<()> {
    if mode != ImportMode::Replace {
        return Ok(());
    }
    for note in gateway.list_notes(owner).await? {
        gateway.delete_note(owner, &note.id).await?;
    }
    Ok(())
}

fn retain_owned(notes: Vec<Note>, owner: &UserIdentity) -> Vec<Note> {
    let total = notes.len();
    let owned = notes
        .into_iter()
        .filter(|note| note.owner_id.as_deref() == Some(owner.id.as_str()))
        .collect::<Vec<_>>();
    if owned.len() != total {
        warn!(
            "event=notes_fetch module=controller status=filtered reason=foreign_owner dropped={}",
            total - owned.len()
        );
    }
    owned
}

fn auth_failure_message(err: &RemoteError, fallback: &str) -> String {
    match err {
        RemoteError::Rejected { message, .. } if !message.trim().is_empty() => message.clone(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{AppEvent, ControllerState, NotesController, Shortcut};
    use crate::model::note::NoteInput;
    use crate::repo::draft_repo::DraftRepository;
    use crate::repo::kv_repo::MemoryKvRepository;
    use crate::repo::note_store::LocalNoteStore;
    use crate::service::view::RenderInstruction;
    use std::ops::ControlFlow;
    use std::rc::Rc;
    use std::time::Duration;

    fn local_controller() -> (NotesController<Rc<MemoryKvRepository>>, Rc<MemoryKvRepository>) {
        let kv = Rc::new(MemoryKvRepository::new());
        let controller = NotesController::local(
            LocalNoteStore::open(Rc::clone(&kv)),
            DraftRepository::new(Rc::clone(&kv)),
            Duration::from_secs(30),
        );
        (controller, kv)
    }

    #[tokio::test]
    async fn edit_then_save_updates_in_place() {
        let (mut controller, _kv) = local_controller();
        controller.start().await;
        controller.save(NoteInput::new("A", "uno")).await;
        let id = controller.notes()[0].id.clone();

        controller.edit(&id);
        assert_eq!(controller.editing(), Some(&id));
        assert_eq!(controller.form().title, "A");

        controller.save(NoteInput::new("A2", "dos")).await;
        assert_eq!(controller.notes().len(), 1);
        assert_eq!(controller.notes()[0].id, id);
        assert_eq!(controller.notes()[0].title, "A2");
        assert_eq!(controller.editing(), None);
        assert_eq!(controller.state(), ControllerState::AuthenticatedPopulated);
    }

    #[tokio::test]
    async fn focus_search_shortcut_emits_instruction_and_shutdown_breaks() {
        let (mut controller, _kv) = local_controller();
        controller.start().await;
        controller.take_instructions();

        let flow = controller
            .dispatch(AppEvent::Shortcut(Shortcut::FocusSearch))
            .await;
        assert_eq!(flow, ControlFlow::Continue(()));
        assert_eq!(
            controller.take_instructions(),
            vec![RenderInstruction::FocusSearch]
        );

        let flow = controller.dispatch(AppEvent::Shutdown).await;
        assert_eq!(flow, ControlFlow::Break(()));
    }

    #[tokio::test]
    async fn stale_delete_token_is_ignored() {
        let (mut controller, _kv) = local_controller();
        controller.start().await;
        controller.save(NoteInput::new("A", "")).await;
        let id = controller.notes()[0].id.clone();

        let first = controller.request_delete(&id).expect("note should exist");
        let second = controller.request_delete(&id).expect("note should exist");
        controller.confirm_delete(first).await;
        assert_eq!(controller.notes().len(), 1);

        controller.confirm_delete(second).await;
        assert!(controller.notes().is_empty());
    }
}
