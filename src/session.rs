use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{timestamp, AuthResponse};

const TOKEN_FILE: &str = "auth_token";
const USER_DATA_FILE: &str = "user_data.json";

/// An authenticated user as remembered between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub token: String,
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn from_auth(auth: AuthResponse) -> Self {
        Self {
            email: auth.email,
            first_name: auth.first_name,
            last_name: auth.last_name,
            token: auth.token,
            expires_at: auth.expires_at,
        }
    }

    /// Valid only while the expiry lies strictly in the future.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn display_name(&self) -> &str {
        match self.first_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.email,
        }
    }
}

/// Persists the current session as two entries in a directory: the raw
/// token and a JSON user profile.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    fn user_data_path(&self) -> PathBuf {
        self.dir.join(USER_DATA_FILE)
    }

    /// Overwrites whatever session was stored before.
    pub fn save(&self, session: &Session) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::storage(&self.dir, e))?;

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| Error::storage(self.user_data_path(), io::Error::other(e)))?;

        let token_path = self.token_path();
        fs::write(&token_path, &session.token).map_err(|e| Error::storage(&token_path, e))?;

        let user_path = self.user_data_path();
        fs::write(&user_path, json).map_err(|e| Error::storage(&user_path, e))?;

        info!(email = %session.email, expires_at = %session.expires_at, "session saved");
        Ok(())
    }

    /// Returns the stored session, if any.
    ///
    /// Unreadable or malformed content is discarded: storage is cleared and
    /// `None` returned, the same as if nothing had been stored.
    pub fn load(&self) -> Option<Session> {
        let token = fs::read_to_string(self.token_path()).ok();
        let user_data = fs::read_to_string(self.user_data_path()).ok();

        let (token, user_data) = match (token, user_data) {
            (Some(token), Some(user_data)) => (token, user_data),
            (None, None) => return None,
            _ => {
                warn!(dir = %self.dir.display(), "incomplete session storage, discarding");
                self.clear_quietly();
                return None;
            }
        };

        match serde_json::from_str::<Session>(&user_data) {
            Ok(mut session) => {
                // The token entry is authoritative, as in the two-key layout.
                session.token = token.trim().to_string();
                Some(session)
            }
            Err(e) => {
                warn!(error = %e, "malformed session data, discarding");
                self.clear_quietly();
                None
            }
        }
    }

    /// Loads the session and drops it if it has already expired.
    ///
    /// `Ok(None)` means nothing usable was stored; an expired session is
    /// cleared and reported as [`Error::SessionExpired`].
    pub fn load_valid_at(&self, now: DateTime<Utc>) -> Result<Option<Session>> {
        let Some(session) = self.load() else {
            return Ok(None);
        };
        if session.is_valid_at(now) {
            return Ok(Some(session));
        }

        info!(email = %session.email, "stored session expired");
        self.clear()?;
        Err(Error::SessionExpired)
    }

    /// Removes both entries. Missing entries are not an error.
    pub fn clear(&self) -> Result<()> {
        for path in [self.token_path(), self.user_data_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::storage(path, e)),
            }
        }
        info!(dir = %self.dir.display(), "session cleared");
        Ok(())
    }

    fn clear_quietly(&self) {
        if let Err(e) = self.clear() {
            warn!(error = %e, "failed to clear session storage");
        }
    }
}
