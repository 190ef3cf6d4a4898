//! Caller identity: application credentials, authenticated sessions and the
//! authentication lifecycle.
//!
//! # Design
//! A `Session` is read-only once created, except for its `CallIdSequence`,
//! which is atomic so that concurrent calls sharing one session still send
//! strictly increasing `call_id` values. Sessions are not `Clone`: a clone
//! would fork the sequence. Share them behind `Arc` instead.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::ApiError;

/// Application identity used for the bootstrap calls.
#[derive(Clone, PartialEq, Eq)]
pub struct AppCredentials {
    pub api_key: String,
    pub secret: String,
    pub is_desktop: bool,
}

impl AppCredentials {
    pub fn web(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            is_desktop: false,
        }
    }

    pub fn desktop(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            is_desktop: true,
        }
    }
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("is_desktop", &self.is_desktop)
            .finish()
    }
}

/// Token returned by the token bootstrap call, exchanged for a session once
/// the user has logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// When a session stops being valid. The wire encodes `Never` as `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    At(SystemTime),
}

impl Expiry {
    /// Convert the epoch-seconds value sent by the service. `None` when the
    /// instant is not representable as a `SystemTime`.
    pub fn from_epoch_seconds(seconds: u64) -> Option<Self> {
        if seconds == 0 {
            return Some(Expiry::Never);
        }
        UNIX_EPOCH.checked_add(Duration::from_secs(seconds)).map(Expiry::At)
    }

    pub fn to_epoch_seconds(self) -> u64 {
        match self {
            Expiry::Never => 0,
            Expiry::At(at) => at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0),
        }
    }

    pub fn is_passed_at(self, now: SystemTime) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(at) => at < now,
        }
    }
}

/// Strictly increasing `call_id` source, seeded from the wall clock.
///
/// Each id is the current epoch milliseconds, or the previous id plus one
/// when the clock has not moved past it.
#[derive(Debug, Default)]
pub struct CallIdSequence {
    last: AtomicU64,
}

impl CallIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = epoch_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// An authenticated context for one user of one application.
pub struct Session {
    api_key: String,
    secret: String,
    session_key: String,
    user_id: u64,
    expiry: Expiry,
    is_desktop: bool,
    call_ids: CallIdSequence,
}

impl Session {
    /// `secret` is the one calls are signed with: the application secret for
    /// web sessions, the session-scoped secret for desktop sessions.
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        session_key: impl Into<String>,
        user_id: u64,
        expiry: Expiry,
        is_desktop: bool,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            session_key: session_key.into(),
            user_id,
            expiry,
            is_desktop,
            call_ids: CallIdSequence::new(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    pub fn is_desktop(&self) -> bool {
        self.is_desktop
    }

    pub fn is_infinite(&self) -> bool {
        self.expiry == Expiry::Never
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expiry.is_passed_at(now)
    }

    pub fn call_ids(&self) -> &CallIdSequence {
        &self.call_ids
    }

    pub fn next_call_id(&self) -> u64 {
        self.call_ids.next()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("session_key", &self.session_key)
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("is_desktop", &self.is_desktop)
            .finish()
    }
}

/// Where a caller stands in the authentication handshake.
///
/// `Unauthenticated → TokenIssued → Active → Expired`. Expiry is derived
/// from the wall clock by [`AuthState::refresh`]; an expired session is not
/// renewed, the caller starts over from `Unauthenticated`.
#[derive(Debug, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    TokenIssued(AuthToken),
    Active(Session),
    Expired(Session),
}

impl AuthState {
    pub fn issue_token(self, token: AuthToken) -> Result<AuthState, ApiError> {
        match self {
            AuthState::Unauthenticated => Ok(AuthState::TokenIssued(token)),
            other => Err(invalid_transition(&other, "issue a token")),
        }
    }

    pub fn activate(self, session: Session) -> Result<AuthState, ApiError> {
        match self {
            AuthState::TokenIssued(_) => Ok(AuthState::Active(session).refresh_at(SystemTime::now())),
            other => Err(invalid_transition(&other, "activate a session")),
        }
    }

    pub fn refresh(self) -> AuthState {
        self.refresh_at(SystemTime::now())
    }

    pub fn refresh_at(self, now: SystemTime) -> AuthState {
        match self {
            AuthState::Active(session) if session.is_expired_at(now) => {
                tracing::debug!(user_id = session.user_id(), "session expired");
                AuthState::Expired(session)
            }
            other => other,
        }
    }

    pub fn token(&self) -> Option<&AuthToken> {
        match self {
            AuthState::TokenIssued(token) => Some(token),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Active(session) => Some(session),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::TokenIssued(_) => "token issued",
            AuthState::Active(_) => "active",
            AuthState::Expired(_) => "expired",
        }
    }
}

fn invalid_transition(state: &AuthState, action: &str) -> ApiError {
    ApiError::Validation(format!("cannot {action} while {}", state.name()))
}
