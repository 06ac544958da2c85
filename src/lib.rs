//! Client for the WebP2P file-storage and authentication service.
//!
//! Keeps the login session on disk, talks to the REST API and maintains a
//! local copy of the user's file list.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod files;
pub mod logging;
pub mod models;
pub mod session;
pub mod view;

pub use api::{ApiClient, FileApi, UploadSource};
pub use config::Config;
pub use error::{Error, Result};
pub use files::{FileLibrary, SortBy};
pub use models::{FileRecord, FileType};
pub use session::{Session, SessionStore};
pub use view::{Screen, ViewController};
