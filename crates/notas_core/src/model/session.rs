//! Session model shared by the session manager and the controller.
//!
//! # Invariants
//! - `Session.identity == None` means anonymous.
//! - Transitions are driven only by [`SessionEvent`]s coming from the auth
//!   collaborator, never by the return value of a sign-in call.

use serde::{Deserialize, Serialize};

/// Authenticated user principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Current session snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Option<UserIdentity>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { identity: None }
    }

    pub fn authenticated(identity: UserIdentity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// Auth state change kinds emitted by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

impl SessionEventKind {
    /// Wire name used by the auth collaborator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::PasswordRecovery => "PASSWORD_RECOVERY",
        }
    }
}

/// One auth state change delivered to `on_change` listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: Session,
}

impl SessionEvent {
    pub fn signed_in(identity: UserIdentity) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            session: Session::authenticated(identity),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            session: Session::anonymous(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionEvent, SessionEventKind, UserIdentity};

    #[test]
    fn event_kinds_use_wire_names() {
        assert_eq!(SessionEventKind::SignedIn.as_str(), "SIGNED_IN");
        let encoded = serde_json::to_string(&SessionEventKind::SignedOut).unwrap();
        assert_eq!(encoded, "\"SIGNED_OUT\"");
    }

    #[test]
    fn constructors_set_session_identity() {
        let event = SessionEvent::signed_in(UserIdentity::new("u1", "a@b.c"));
        assert!(event.session.is_authenticated());
        assert!(!SessionEvent::signed_out().session.is_authenticated());
    }
}
