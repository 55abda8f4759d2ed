use crate::{
    authority::{
        AuthSession,
        AuthorityClient,
        AuthorityError,
    },
    store::CredentialStore,
    types::{
        Credential,
        Identity,
    },
};
use std::sync::{
    Arc,
    Mutex,
};
use thiserror::Error;
use tracing::{
    debug,
    info,
    warn,
};

pub const CREDENTIAL_KEY: &str = "token";
pub const IDENTITY_KEY: &str = "user";

/// Shared slot holding the active bearer credential. Written only by
/// `SessionManager`; `AuthorityClient` reads it when issuing requests.
#[derive(Clone, Default)]
pub struct CredentialSlot(Arc<Mutex<Option<Credential>>>);

impl CredentialSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Credential> {
        match self.0.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    fn set(&self, credential: Option<Credential>) {
        if let Ok(mut guard) = self.0.lock() {
            *guard = credential;
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionPhase {
    Initializing,
    Anonymous,
    Authenticating,
    Authenticated,
    AuthError,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum SessionGuardError {
    #[error("an authentication attempt is already in flight")]
    AuthenticationInFlight,
    #[error("already signed in; log out first")]
    AlreadyAuthenticated,
    #[error("session is still restoring")]
    StillResolving,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Guard(#[from] SessionGuardError),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// Ticket returned by `begin_auth`; a completion whose generation no longer
/// matches (because a logout intervened) is discarded without touching state.
#[derive(Debug)]
pub struct AuthTicket {
    generation: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Completion {
    Applied,
    Stale,
}

/// Owns the authentication lifecycle: restoration from the credential store,
/// login/registration, explicit logout, and the implicit logout performed
/// when the authority rejects the active credential. Identity and credential
/// are always set together or cleared together.
pub struct SessionManager {
    phase: SessionPhase,
    identity: Option<Identity>,
    restored: bool,
    generation: u64,
    last_error: Option<String>,
    credentials: CredentialSlot,
    store: Box<dyn CredentialStore>,
}

impl SessionManager {
    pub fn new(store: Box<dyn CredentialStore>) -> Self {
        Self {
            phase: SessionPhase::Initializing,
            identity: None,
            restored: false,
            generation: 0,
            last_error: None,
            credentials: CredentialSlot::new(),
            store,
        }
    }

    /// Handle for wiring an `AuthorityClient` to this session's credential.
    pub fn credentials(&self) -> CredentialSlot {
        self.credentials.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }

    /// True only while the persisted session has not yet been examined.
    pub fn is_resolving(&self) -> bool {
        self.phase == SessionPhase::Initializing
    }

    /// Whether the current session came from persisted storage rather than a
    /// fresh login.
    pub fn restored(&self) -> bool {
        self.restored
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Examine persisted state once at startup. A credential and identity
    /// that were persisted together restore the session without contacting
    /// the authority; validity is discovered lazily by the first
    /// authenticated request. Anything less than the full pair is cleared.
    pub fn restore(&mut self) {
        let token = self.store.get(CREDENTIAL_KEY);
        let identity = self
            .store
            .get(IDENTITY_KEY)
            .and_then(|raw| match serde_json::from_str::<Identity>(&raw) {
                Ok(identity) => Some(identity),
                Err(err) => {
                    warn!(%err, "persisted identity is not valid JSON; discarding");
                    None
                }
            });
        match (token, identity) {
            (Some(token), Some(identity)) => {
                info!(username = %identity.username, "restored persisted session");
                self.credentials.set(Some(Credential::new(token)));
                self.identity = Some(identity);
                self.restored = true;
                self.phase = SessionPhase::Authenticated;
            }
            (token, identity) => {
                if token.is_some() || identity.is_some() {
                    warn!("partial persisted session; clearing");
                }
                self.store.remove(CREDENTIAL_KEY);
                self.store.remove(IDENTITY_KEY);
                self.phase = SessionPhase::Anonymous;
            }
        }
    }

    /// Claim the single authentication-in-flight slot.
    pub fn begin_auth(&mut self) -> Result<AuthTicket, SessionGuardError> {
        match self.phase {
            SessionPhase::Authenticating => Err(SessionGuardError::AuthenticationInFlight),
            SessionPhase::Authenticated => Err(SessionGuardError::AlreadyAuthenticated),
            SessionPhase::Initializing => Err(SessionGuardError::StillResolving),
            SessionPhase::Anonymous | SessionPhase::AuthError => {
                self.phase = SessionPhase::Authenticating;
                Ok(AuthTicket {
                    generation: self.generation,
                })
            }
        }
    }

    /// Commit or reject the outcome of an authentication attempt. On success
    /// the credential and identity are persisted together; on failure nothing
    /// is persisted and the session stays signed out with a user-facing
    /// message.
    pub fn complete_auth(
        &mut self,
        ticket: AuthTicket,
        result: Result<AuthSession, AuthorityError>,
    ) -> Result<Completion, AuthorityError> {
        if ticket.generation != self.generation {
            debug!("discarding stale authentication response");
            return Ok(Completion::Stale);
        }
        match result {
            Ok(session) => {
                // Credential and identity are persisted together or not at
                // all; restoration treats anything partial as absent.
                match serde_json::to_string(&session.identity) {
                    Ok(identity_json) => {
                        self.store.set(CREDENTIAL_KEY, session.credential.token());
                        self.store.set(IDENTITY_KEY, &identity_json);
                    }
                    Err(err) => {
                        warn!(%err, "failed to encode identity; session not persisted");
                    }
                }
                info!(username = %session.identity.username, "signed in");
                self.credentials.set(Some(session.credential));
                self.identity = Some(session.identity);
                self.restored = false;
                self.last_error = None;
                self.phase = SessionPhase::Authenticated;
                Ok(Completion::Applied)
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                self.phase = SessionPhase::AuthError;
                Err(err)
            }
        }
    }

    pub async fn login(
        &mut self,
        authority: &AuthorityClient,
        username: &str,
        password: &str,
    ) -> Result<Completion, SessionError> {
        let ticket = self.begin_auth()?;
        let result = authority.login(username, password).await;
        Ok(self.complete_auth(ticket, result)?)
    }

    pub async fn register(
        &mut self,
        authority: &AuthorityClient,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<Completion, SessionError> {
        let ticket = self.begin_auth()?;
        let result = authority.register(username, password, email).await;
        Ok(self.complete_auth(ticket, result)?)
    }

    /// Clear the persisted credential and the in-memory identity. Safe to
    /// call from any phase, any number of times.
    pub fn logout(&mut self) {
        self.store.remove(CREDENTIAL_KEY);
        self.store.remove(IDENTITY_KEY);
        self.credentials.set(None);
        self.identity = None;
        self.restored = false;
        self.generation += 1;
        self.last_error = None;
        self.phase = SessionPhase::Anonymous;
    }

    /// Implicit logout: the authority rejected the active credential on some
    /// request. The only non-user-initiated way out of `Authenticated`.
    pub fn handle_unauthorized(&mut self, message: Option<String>) {
        info!("credential rejected by the authority; signing out");
        self.logout();
        self.last_error =
            Some(message.unwrap_or_else(|| String::from("session expired; log in again")));
    }
}
