use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::Result;
use crate::session::{Session, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Dashboard,
    Home,
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
}

impl Screen {
    pub fn requires_session(&self) -> bool {
        matches!(self, Self::Dashboard | Self::Home)
    }
}

/// Picks what to show: a screen outside the active set redirects to that
/// set's landing screen.
pub fn route(requested: Screen, authenticated: bool) -> Screen {
    match (authenticated, requested.requires_session()) {
        (true, true) | (false, false) => requested,
        (true, false) => Screen::Dashboard,
        (false, true) => Screen::Login,
    }
}

/// Holds the active session and decides which screens are reachable.
#[derive(Debug)]
pub struct ViewController {
    store: SessionStore,
    session: Option<Session>,
}

impl ViewController {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            session: None,
        }
    }

    /// Restores a stored session if it is still valid.
    ///
    /// A stored but expired session is removed and reported as
    /// [`Error::SessionExpired`](crate::Error::SessionExpired); the
    /// controller is then unauthenticated.
    pub fn start_at(&mut self, now: DateTime<Utc>) -> Result<Option<&Session>> {
        self.session = None;
        self.session = self.store.load_valid_at(now)?;
        Ok(self.session.as_ref())
    }

    pub fn start(&mut self) -> Result<Option<&Session>> {
        self.start_at(Utc::now())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// The login flow has already persisted the session.
    pub fn on_login(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub fn on_logout(&mut self) -> Result<()> {
        self.session = None;
        self.store.clear()
    }

    /// Drops the session once it has expired. Returns whether it did.
    pub fn check_expiry(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let expired = self
            .session
            .as_ref()
            .is_some_and(|session| !session.is_valid_at(now));
        if !expired {
            return Ok(false);
        }

        info!("session expired");
        self.on_logout()?;
        Ok(true)
    }

    pub fn current_screen(&self, requested: Screen) -> Screen {
        route(requested, self.is_authenticated())
    }
}
