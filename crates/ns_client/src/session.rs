use chrono::{DateTime, Duration, Utc};
use ns_core::AuthToken;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{info, warn};

/// What views observe to decide between the dashboard and the login screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
    /// The backend rejected the token; the user has to log in again.
    Expired,
}

impl SessionState {
    pub fn requires_login(&self) -> bool {
        !matches!(self, SessionState::Authenticated)
    }
}

struct ActiveToken {
    value: String,
    expires_at: DateTime<Utc>,
}

struct SessionInner {
    token: RwLock<Option<ActiveToken>>,
    state: watch::Sender<SessionState>,
}

/// Process-wide auth state, shared by every gateway call.
///
/// All token reads go through [`Session::bearer`], so a teardown is seen by
/// every request issued after it.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        Self {
            inner: Arc::new(SessionInner {
                token: RwLock::new(None),
                state,
            }),
        }
    }

    /// A session that starts out authenticated with `token`, for tokens
    /// supplied from the command line or the environment.
    pub fn with_token(token: impl Into<String>, expires_in: u64) -> Self {
        let session = Self::new();
        session.begin(&AuthToken {
            token: token.into(),
            expires_in,
        });
        session
    }

    pub fn begin(&self, token: &AuthToken) {
        let expires_at = Utc::now() + Duration::seconds(token.expires_in as i64);
        *self.inner.token.write().unwrap_or_else(PoisonError::into_inner) = Some(ActiveToken {
            value: token.token.clone(),
            expires_at,
        });
        self.inner.state.send_replace(SessionState::Authenticated);
        info!("🔑 Session started, expires at {}", expires_at);
    }

    /// The bearer token for the next request, if the session holds a live one.
    pub fn bearer(&self) -> Option<String> {
        let token = self.inner.token.read().unwrap_or_else(PoisonError::into_inner);
        token
            .as_ref()
            .filter(|t| t.expires_at > Utc::now())
            .map(|t| t.value.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer().is_some()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// User-initiated logout.
    pub fn logout(&self) {
        self.clear_token();
        self.inner.state.send_replace(SessionState::Anonymous);
        info!("👋 Logged out");
    }

    /// Teardown after the backend answered 401.
    pub fn expire(&self) {
        self.clear_token();
        self.inner.state.send_replace(SessionState::Expired);
        warn!("🔒 Session rejected by the backend, login required");
    }

    fn clear_token(&self) {
        *self.inner.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.bearer().map(|_| "<redacted>"))
            .field("state", &self.state())
            .finish()
    }
}
