use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Message shown when a failed request carries no readable server message.
pub const NETWORK_ERROR: &str = "Network error";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected on the client before any request was made.
    #[error("{0}")]
    Validation(String),

    /// Non-success status, transport failure or a `success: false` envelope.
    #[error("{0}")]
    RequestFailed(String),

    #[error("You must be logged in. Use: webp2p login -e <email> -p <password>")]
    NotAuthenticated,

    #[error("Your session has expired. Please log in again")]
    SessionExpired,

    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed(message.into())
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// The caller should clear the session and fall back to the login screens.
    pub fn is_session_problem(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::SessionExpired)
    }
}
