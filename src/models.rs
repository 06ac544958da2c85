use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Envelope wrapped around every JSON reply of the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(default, with = "timestamp::option")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl<T> ApiResponse<T> {
    /// Treats `success: false` as a failed request carrying the server message.
    pub fn into_result(self) -> Result<Option<T>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(Error::RequestFailed(self.message))
        }
    }

    pub fn into_data(self) -> Result<T> {
        let message = self.message.clone();
        self.into_result()?.ok_or_else(|| {
            if message.is_empty() {
                Error::request_failed("Server returned no data")
            } else {
                Error::RequestFailed(message)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    #[serde(rename = "type", default)]
    pub token_type: Option<String>,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForgotPasswordRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest<'a> {
    pub token: &'a str,
    pub new_password: &'a str,
    pub confirm_password: &'a str,
}

/// Server side classification of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    Image,
    Video,
    #[default]
    Document,
}

// Anything the server adds later is shown as a document.
impl<'de> Deserialize<'de> for FileType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

impl FileType {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.starts_with("image/") => Self::Image,
            Some(ct) if ct.starts_with("video/") => Self::Video,
            _ => Self::Document,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Document => "DOCUMENT",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IMAGE" => Ok(Self::Image),
            "VIDEO" => Ok(Self::Video),
            "DOCUMENT" => Ok(Self::Document),
            other => Err(Error::validation(format!(
                "Unknown file type '{other}'. Use IMAGE, VIDEO or DOCUMENT"
            ))),
        }
    }
}

/// File metadata as returned by the `/files` endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub id: String,
    #[serde(default)]
    pub file_name: String,
    pub original_file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub file_size: u64,
    #[serde(default)]
    pub file_type: Option<FileType>,
    #[serde(with = "timestamp")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// A file as the client knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub file_type: FileType,
    pub uploaded_at: DateTime<Utc>,
    pub download_url: String,
}

impl FileRecord {
    pub fn from_data(data: FileData, download_url: String) -> Self {
        let file_type = data
            .file_type
            .unwrap_or_else(|| FileType::from_content_type(data.content_type.as_deref()));
        let content_type = data
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Self {
            id: data.id,
            name: data.original_file_name,
            size: data.file_size,
            content_type,
            file_type,
            uploaded_at: data.uploaded_at,
            download_url,
        }
    }

    /// Name to save a download under: the last component of the server name,
    /// or the id when that name has no usable component.
    pub fn local_file_name(&self) -> PathBuf {
        match Path::new(&self.name).file_name() {
            Some(name) => PathBuf::from(name),
            None => PathBuf::from(&self.id),
        }
    }
}

/// Lenient (de)serialization of backend timestamps.
///
/// The backend writes zone-less local date-times, which are taken as UTC.
/// RFC 3339 with an explicit offset is accepted as well. Output is always
/// RFC 3339.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(value, NAIVE_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        // An unreadable envelope timestamp is dropped rather than failing the reply.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            Ok(raw.as_deref().and_then(super::parse))
        }
    }
}
