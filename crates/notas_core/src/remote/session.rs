//! Auth collaborator contract.
//!
//! # Invariants
//! - A successful call does not by itself change the controller's session;
//!   only events delivered through `on_change` do.
//! - Listener registration lasts for the process lifetime.

use crate::model::session::{SessionEvent, UserIdentity};
use crate::remote::gateway::RemoteResult;
use async_trait::async_trait;
use std::fmt::{Debug, Formatter};

/// E-mail/password pair. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Third-party sign-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthProvider {
    GitHub,
    Google,
}

impl AuthProvider {
    /// Provider id understood by the auth service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Google => "google",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::Google => "Google",
        }
    }
}

/// Result of a successful sign-up request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Account is active; a `SIGNED_IN` event follows.
    SignedIn,
    /// Account must be confirmed by e-mail before signing in.
    ConfirmationRequired,
}

/// Callback invoked for every auth state change.
pub type SessionListener = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// Async proxy to the hosted auth subsystem.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Resolves the currently signed-in identity, if any.
    async fn current_identity(&self) -> RemoteResult<Option<UserIdentity>>;

    async fn sign_in(&self, credentials: &Credentials) -> RemoteResult<UserIdentity>;

    async fn sign_up(&self, credentials: &Credentials) -> RemoteResult<SignUpOutcome>;

    async fn sign_in_with_provider(&self, provider: AuthProvider) -> RemoteResult<()>;

    async fn sign_out(&self) -> RemoteResult<()>;

    /// Registers a listener for auth state changes.
    fn on_change(&self, listener: SessionListener);
}

#[cfg(test)]
mod tests {
    use super::{AuthProvider, Credentials};

    #[test]
    fn credentials_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("a@b.c", "hunter22"));
        assert!(rendered.contains("a@b.c"));
        assert!(!rendered.contains("hunter22"));
    }

    #[test]
    fn provider_ids_are_lowercase() {
        assert_eq!(AuthProvider::GitHub.as_str(), "github");
        assert_eq!(AuthProvider::Google.display_name(), "Google");
    }
}
