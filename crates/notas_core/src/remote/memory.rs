//! In-process stand-in for the hosted backend.
//!
//! # Responsibility
//! - Implement both [`RemoteNoteGateway`] and [`SessionManager`] without a
//!   network, for tests and offline demos.
//! - Reproduce the service semantics the controller depends on: row-level
//!   scoping by `user_id`, ILIKE search, newest-first ordering, change feed.
//!
//! # Invariants
//! - Row-scoped calls fail with `Unauthorized` unless `owner` is the
//!   currently signed-in identity.
//! - Assigned timestamps are strictly increasing.
//! - Listeners are invoked without any internal lock held.

use crate::model::note::{Note, NoteBody, NoteId, Timestamp};
use crate::model::session::{SessionEvent, UserIdentity};
use crate::remote::gateway::{
    ChangeFeed, ChangeKind, NoteChange, NoteRow, RemoteError, RemoteNoteGateway, RemoteResult,
};
use crate::remote::session::{
    AuthProvider, Credentials, SessionListener, SessionManager, SignUpOutcome,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::debug;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANGE_FEED_CAPACITY: usize = 64;
const MIN_PASSWORD_LEN: usize = 6;

type SharedListener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Account {
    identity: UserIdentity,
    password: String,
    confirmed: bool,
}

#[derive(Default)]
struct BackendState {
    rows: Vec<NoteRow>,
    accounts: BTreeMap<String, Account>,
    providers: BTreeMap<AuthProvider, UserIdentity>,
    current: Option<UserIdentity>,
    offline: bool,
    require_confirmation: bool,
    last_timestamp: Option<Timestamp>,
}

impl BackendState {
    fn next_timestamp(&mut self) -> Timestamp {
        let now = Utc::now();
        let next = match self.last_timestamp {
            Some(last) if last >= now => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }

    fn ensure_online(&self) -> RemoteResult<()> {
        if self.offline {
            return Err(RemoteError::Network("backend unreachable".to_string()));
        }
        Ok(())
    }

    fn authorize(&self, owner: &UserIdentity) -> RemoteResult<()> {
        self.ensure_online()?;
        match self.current.as_ref() {
            None => Err(RemoteError::Unauthorized("no active session".to_string())),
            Some(current) if current.id != owner.id => Err(RemoteError::Unauthorized(
                "row-level policy rejected user_id".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }

    fn owned_rows_newest_first(&self, owner_id: &str) -> Vec<NoteRow> {
        let mut rows = self
            .rows
            .iter()
            .filter(|row| row.user_id == owner_id)
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        rows
    }
}

/// Backend double holding rows, accounts and the current session.
pub struct InMemoryBackend {
    state: Mutex<BackendState>,
    listeners: Mutex<Vec<SharedListener>>,
    changes: broadcast::Sender<NoteChange>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            state: Mutex::new(BackendState::default()),
            listeners: Mutex::new(Vec::new()),
            changes,
        }
    }

    /// New sign-ups must be confirmed via [`Self::confirm_email`].
    pub fn with_email_confirmation(self) -> Self {
        self.state().require_confirmation = true;
        self
    }

    /// Registers a confirmed password account and returns its identity.
    pub fn register_account(&self, email: &str, password: &str) -> UserIdentity {
        let identity = UserIdentity::new(Uuid::new_v4().to_string(), email.trim());
        self.state().accounts.insert(
            normalize_email(email),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
                confirmed: true,
            },
        );
        identity
    }

    /// Enables a third-party provider that signs in as `identity`.
    pub fn register_provider(&self, provider: AuthProvider, identity: UserIdentity) {
        self.state().providers.insert(provider, identity);
    }

    /// Marks a pending sign-up as confirmed. Returns `false` if unknown.
    pub fn confirm_email(&self, email: &str) -> bool {
        match self.state().accounts.get_mut(&normalize_email(email)) {
            Some(account) => {
                account.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Simulates losing (or regaining) connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Drops the current session server-side and emits `SIGNED_OUT`.
    pub fn expire_session(&self) {
        self.state().current = None;
        self.notify(&SessionEvent::signed_out());
    }

    /// Inserts a row as another device would, bypassing the session check.
    pub fn insert_external(
        &self,
        owner: &UserIdentity,
        title: &str,
        content: &str,
    ) -> RemoteResult<Note> {
        let row = {
            let mut state = self.state();
            let now = state.next_timestamp();
            let row = NoteRow {
                id: Uuid::new_v4().to_string(),
                title: title.to_string(),
                content: content.to_string(),
                user_id: owner.id.clone(),
                created_at: now,
                updated_at: now,
            };
            state.rows.push(row.clone());
            row
        };
        self.publish(ChangeKind::Insert, &row);
        row.into_note()
    }

    /// Number of rows owned by `owner_id`, regardless of session.
    pub fn row_count(&self, owner_id: &str) -> usize {
        self.state()
            .rows
            .iter()
            .filter(|row| row.user_id == owner_id)
            .count()
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: &SessionEvent) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(
            "event=session_change module=remote kind={} listeners={}",
            event.kind.as_str(),
            listeners.len()
        );
        for listener in listeners {
            listener(event);
        }
    }

    fn publish(&self, kind: ChangeKind, row: &NoteRow) {
        let change = NoteChange::on_notes(
            kind,
            NoteId::parse(row.id.clone()),
            Some(row.user_id.clone()),
        );
        // No subscribers is not an error for a broadcast feed.
        let _ = self.changes.send(change);
    }

    fn list_rows(&self, owner: &UserIdentity) -> RemoteResult<Vec<Note>> {
        let state = self.state();
        state.authorize(owner)?;
        rows_into_notes(state.owned_rows_newest_first(&owner.id))
    }

    fn get_row(&self, owner: &UserIdentity, id: &NoteId) -> RemoteResult<Option<Note>> {
        let state = self.state();
        state.authorize(owner)?;
        state
            .rows
            .iter()
            .find(|row| row.user_id == owner.id && row.id == id.as_str())
            .cloned()
            .map(NoteRow::into_note)
            .transpose()
    }

    fn insert_row(&self, owner: &UserIdentity, body: &NoteBody) -> RemoteResult<Note> {
        let row = {
            let mut state = self.state();
            state.authorize(owner)?;
            let now = state.next_timestamp();
            let row = NoteRow {
                id: Uuid::new_v4().to_string(),
                title: body.title().to_string(),
                content: body.content().to_string(),
                user_id: owner.id.clone(),
                created_at: now,
                updated_at: now,
            };
            state.rows.push(row.clone());
            row
        };
        self.publish(ChangeKind::Insert, &row);
        row.into_note()
    }

    fn update_row(
        &self,
        owner: &UserIdentity,
        id: &NoteId,
        body: &NoteBody,
    ) -> RemoteResult<Note> {
        let row = {
            let mut state = self.state();
            state.authorize(owner)?;
            let now = state.next_timestamp();
            let row = state
                .rows
                .iter_mut()
                .find(|row| row.user_id == owner.id && row.id == id.as_str())
                .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
            row.title = body.title().to_string();
            row.content = body.content().to_string();
            row.updated_at = now;
            row.clone()
        };
        self.publish(ChangeKind::Update, &row);
        row.into_note()
    }

    fn delete_row(&self, owner: &UserIdentity, id: &NoteId) -> RemoteResult<()> {
        let removed = {
            let mut state = self.state();
            state.authorize(owner)?;
            let position = state
                .rows
                .iter()
                .position(|row| row.user_id == owner.id && row.id == id.as_str());
            position.map(|index| state.rows.remove(index))
        };
        if let Some(row) = removed {
            self.publish(ChangeKind::Delete, &row);
        }
        Ok(())
    }

    fn search_rows(&self, owner: &UserIdentity, query: &str) -> RemoteResult<Vec<Note>> {
        let state = self.state();
        state.authorize(owner)?;
        let matcher = ilike_regex(&format!("%{query}%"))
            .map_err(|err| RemoteError::rejected("invalid_pattern", err.to_string()))?;
        let rows = state
            .owned_rows_newest_first(&owner.id)
            .into_iter()
            .filter(|row| matcher.is_match(&row.title) || matcher.is_match(&row.content))
            .collect();
        rows_into_notes(rows)
    }

    fn sign_in_account(&self, credentials: &Credentials) -> RemoteResult<UserIdentity> {
        let mut state = self.state();
        state.ensure_online()?;
        let account = state
            .accounts
            .get(&normalize_email(&credentials.email))
            .filter(|account| account.password == credentials.password)
            .ok_or_else(|| {
                RemoteError::rejected("invalid_credentials", "Invalid login credentials")
            })?;
        if !account.confirmed {
            return Err(RemoteError::rejected(
                "email_not_confirmed",
                "Email not confirmed",
            ));
        }
        let identity = account.identity.clone();
        state.current = Some(identity.clone());
        Ok(identity)
    }

    fn sign_up_account(
        &self,
        credentials: &Credentials,
    ) -> RemoteResult<(SignUpOutcome, UserIdentity)> {
        let mut state = self.state();
        state.ensure_online()?;
        let email = credentials.email.trim();
        if !email.contains('@') {
            return Err(RemoteError::rejected(
                "validation_failed",
                "Unable to validate email address: invalid format",
            ));
        }
        if credentials.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(RemoteError::rejected(
                "weak_password",
                "Password should be at least 6 characters",
            ));
        }
        let key = normalize_email(email);
        if state.accounts.contains_key(&key) {
            return Err(RemoteError::rejected(
                "user_already_exists",
                "User already registered",
            ));
        }

        let identity = UserIdentity::new(Uuid::new_v4().to_string(), email);
        let confirmed = !state.require_confirmation;
        state.accounts.insert(
            key,
            Account {
                identity: identity.clone(),
                password: credentials.password.clone(),
                confirmed,
            },
        );
        if confirmed {
            state.current = Some(identity.clone());
            Ok((SignUpOutcome::SignedIn, identity))
        } else {
            Ok((SignUpOutcome::ConfirmationRequired, identity))
        }
    }

    fn sign_in_provider(&self, provider: AuthProvider) -> RemoteResult<UserIdentity> {
        let mut state = self.state();
        state.ensure_online()?;
        let identity = state.providers.get(&provider).cloned().ok_or_else(|| {
            RemoteError::rejected(
                "provider_disabled",
                format!("Unsupported provider: {} is not enabled", provider.as_str()),
            )
        })?;
        state.current = Some(identity.clone());
        Ok(identity)
    }
}

#[async_trait]
impl RemoteNoteGateway for InMemoryBackend {
    async fn list_notes(&self, owner: &UserIdentity) -> RemoteResult<Vec<Note>> {
        self.list_rows(owner)
    }

    async fn get_note(&self, owner: &UserIdentity, id: &NoteId) -> RemoteResult<Option<Note>> {
        self.get_row(owner, id)
    }

    async fn create_note(&self, owner: &UserIdentity, body: &NoteBody) -> RemoteResult<Note> {
        self.insert_row(owner, body)
    }

    async fn update_note(
        &self,
        owner: &UserIdentity,
        id: &NoteId,
        body: &NoteBody,
    ) -> RemoteResult<Note> {
        self.update_row(owner, id, body)
    }

    async fn delete_note(&self, owner: &UserIdentity, id: &NoteId) -> RemoteResult<()> {
        self.delete_row(owner, id)
    }

    async fn search_notes(&self, owner: &UserIdentity, query: &str) -> RemoteResult<Vec<Note>> {
        self.search_rows(owner, query)
    }

    fn subscribe_changes(&self) -> RemoteResult<ChangeFeed> {
        self.state().ensure_online()?;
        Ok(self.changes.subscribe())
    }
}

#[async_trait]
impl SessionManager for InMemoryBackend {
    async fn current_identity(&self) -> RemoteResult<Option<UserIdentity>> {
        let state = self.state();
        state.ensure_online()?;
        Ok(state.current.clone())
    }

    async fn sign_in(&self, credentials: &Credentials) -> RemoteResult<UserIdentity> {
        let identity = self.sign_in_account(credentials)?;
        self.notify(&SessionEvent::signed_in(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(&self, credentials: &Credentials) -> RemoteResult<SignUpOutcome> {
        let (outcome, identity) = self.sign_up_account(credentials)?;
        if outcome == SignUpOutcome::SignedIn {
            self.notify(&SessionEvent::signed_in(identity));
        }
        Ok(outcome)
    }

    async fn sign_in_with_provider(&self, provider: AuthProvider) -> RemoteResult<()> {
        let identity = self.sign_in_provider(provider)?;
        self.notify(&SessionEvent::signed_in(identity));
        Ok(())
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        {
            let mut state = self.state();
            state.ensure_online()?;
            state.current = None;
        }
        self.notify(&SessionEvent::signed_out());
        Ok(())
    }

    fn on_change(&self, listener: SessionListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::from(listener));
    }
}

/// Translates a SQL ILIKE pattern into an anchored case-insensitive regex.
///
/// `%` matches any run, `_` one character, `\` escapes the next character.
pub fn ilike_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::from("(?is)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    expr.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
                }
            }
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn rows_into_notes(rows: Vec<NoteRow>) -> RemoteResult<Vec<Note>> {
    rows.into_iter().map(NoteRow::into_note).collect()
}

#[cfg(test)]
mod tests {
    use super::{ilike_regex, InMemoryBackend};
    use crate::model::note::NoteInput;
    use crate::model::session::SessionEventKind;
    use crate::remote::gateway::{RemoteError, RemoteNoteGateway};
    use crate::remote::session::{Credentials, SessionManager, SignUpOutcome};
    use std::sync::{Arc, Mutex};

    #[test]
    fn ilike_translates_wildcards_and_escapes() {
        let re = ilike_regex("%a_c%").unwrap();
        assert!(re.is_match("xxABCxx"));
        assert!(!re.is_match("ac"));

        let literal = ilike_regex(r"%50\%%").unwrap();
        assert!(literal.is_match("descuento 50% hoy"));
        assert!(!literal.is_match("descuento 50 hoy"));

        assert!(ilike_regex("%(.*)%").unwrap().is_match("a (.*) b"));
    }

    #[tokio::test]
    async fn row_scoped_calls_require_matching_session() {
        let backend = InMemoryBackend::new();
        let alice = backend.register_account("alice@example.com", "secret1");
        let bob = backend.register_account("bob@example.com", "secret2");

        let err = backend.list_notes(&alice).await.unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized(_)));

        backend
            .sign_in(&Credentials::new("alice@example.com", "secret1"))
            .await
            .unwrap();
        assert!(backend.list_notes(&alice).await.unwrap().is_empty());
        assert!(matches!(
            backend.list_notes(&bob).await,
            Err(RemoteError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn list_and_search_are_newest_first_and_scoped() {
        let backend = InMemoryBackend::new();
        let alice = backend.register_account("alice@example.com", "secret1");
        let bob = backend.register_account("bob@example.com", "secret2");
        backend.insert_external(&bob, "bob compra", "pan").unwrap();
        backend
            .sign_in(&Credentials::new("ALICE@example.com", "secret1"))
            .await
            .unwrap();

        for title in ["primera compra", "segunda", "tercera COMPRA"] {
            let body = NoteInput::new(title, "").normalize().unwrap();
            backend.create_note(&alice, &body).await.unwrap();
        }

        let listed = backend.list_notes(&alice).await.unwrap();
        let titles = listed.iter().map(|n| n.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["tercera COMPRA", "segunda", "primera compra"]);

        let found = backend.search_notes(&alice, "compra").await.unwrap();
        let titles = found.iter().map(|n| n.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["tercera COMPRA", "primera compra"]);
    }

    #[tokio::test]
    async fn sign_in_and_out_notify_listeners() {
        let backend = InMemoryBackend::new();
        backend.register_account("alice@example.com", "secret1");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        backend.on_change(Box::new(move |event| {
            sink.lock().unwrap().push(event.kind);
        }));

        let err = backend
            .sign_in(&Credentials::new("alice@example.com", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_credentials");

        backend
            .sign_in(&Credentials::new("alice@example.com", "secret1"))
            .await
            .unwrap();
        backend.sign_out().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![SessionEventKind::SignedIn, SessionEventKind::SignedOut]
        );
    }

    #[tokio::test]
    async fn sign_up_with_confirmation_blocks_sign_in_until_confirmed() {
        let backend = InMemoryBackend::new().with_email_confirmation();
        let credentials = Credentials::new("new@example.com", "secret1");
        let outcome = backend.sign_up(&credentials).await.unwrap();
        assert_eq!(outcome, SignUpOutcome::ConfirmationRequired);

        let err = backend.sign_in(&credentials).await.unwrap_err();
        assert_eq!(err.code(), "email_not_confirmed");

        assert!(backend.confirm_email("new@example.com"));
        backend.sign_in(&credentials).await.unwrap();

        let dup = backend.sign_up(&credentials).await.unwrap_err();
        assert_eq!(dup.code(), "user_already_exists");
    }

    #[tokio::test]
    async fn offline_backend_fails_with_network_error() {
        let backend = InMemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(
            backend.current_identity().await,
            Err(RemoteError::Network(_))
        ));
        assert!(backend.subscribe_changes().is_err());
    }
}
