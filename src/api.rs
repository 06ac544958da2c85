use std::fs;
use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result, NETWORK_ERROR};
use crate::models::{
    ApiResponse, AuthResponse, FileData, FileRecord, FileType, ForgotPasswordRequest, LoginRequest,
    RegisterRequest, ResetPasswordRequest,
};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A file ready to be sent to `POST /files/upload`.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSource {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadSource {
    /// Guesses the content type from the file name's extension.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = mime_guess::from_path(&file_name)
            .first_raw()
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::validation(format!("File not found: {}", path.display())));
        }

        let bytes = fs::read(path).map_err(|e| Error::storage(path, e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self::new(file_name, bytes))
    }
}

/// The file operations the reconciler relies on.
#[async_trait]
pub trait FileApi: Send + Sync {
    async fn upload_file(&self, source: &UploadSource) -> Result<FileRecord>;
    async fn list_my_files(&self) -> Result<Vec<FileRecord>>;
    async fn rename_file(&self, id: &str, new_name: &str) -> Result<FileRecord>;
    async fn delete_file(&self, id: &str) -> Result<()>;
}

/// Error body of a failed request. Only the message is of interest.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the authentication and file endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// `base_url` must end in `/` (see [`crate::config::parse_base_url`]).
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.set_token(token);
        self
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn require_token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(Error::NotAuthenticated)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be used as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, authenticated: bool) -> Result<RequestBuilder> {
        debug!(%method, path = url.path(), "sending request");
        let builder = self.http.request(method, url);
        if authenticated {
            Ok(builder.bearer_auth(self.require_token()?))
        } else {
            Ok(builder)
        }
    }

    /// Sends the request and collapses every failure into `RequestFailed`.
    async fn dispatch(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, "request could not be sent");
            Error::request_failed(NETWORK_ERROR)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(ErrorBody {
                message: Some(message),
            }) if !message.is_empty() => message,
            Ok(_) => format!("HTTP error! status: {}", status.as_u16()),
            Err(_) => NETWORK_ERROR.to_string(),
        };
        warn!(status = status.as_u16(), %message, "request failed");
        Err(Error::RequestFailed(message))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<ApiResponse<T>> {
        let response = self.dispatch(builder).await?;
        response.json::<ApiResponse<T>>().await.map_err(|e| {
            warn!(error = %e, "unreadable response body");
            Error::request_failed(format!("Invalid response from server: {e}"))
        })
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<ApiResponse<T>> {
        let url = self.endpoint(segments)?;
        self.send(self.request(Method::POST, url, false)?.json(body)).await
    }

    fn to_record(&self, data: FileData) -> Result<FileRecord> {
        let download_url = self.download_url(&data.id)?;
        Ok(FileRecord::from_data(data, download_url.into()))
    }

    fn to_records(&self, files: Vec<FileData>) -> Result<Vec<FileRecord>> {
        files.into_iter().map(|data| self.to_record(data)).collect()
    }

    // Authentication

    pub async fn login(&self, email: &str, password: &str) -> Result<ApiResponse<AuthResponse>> {
        self.send_json(&["auth", "login"], &LoginRequest { email, password })
            .await
    }

    pub async fn register(&self, profile: &RegisterRequest) -> Result<ApiResponse<String>> {
        self.send_json(&["auth", "register"], profile).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<ApiResponse<String>> {
        self.send_json(&["auth", "forgot-password"], &ForgotPasswordRequest { email })
            .await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<ApiResponse<String>> {
        let body = ResetPasswordRequest {
            token,
            new_password,
            confirm_password,
        };
        self.send_json(&["auth", "reset-password"], &body).await
    }

    pub async fn validate_reset_token(&self, token: &str) -> Result<ApiResponse<String>> {
        let mut url = self.endpoint(&["auth", "validate-reset-token"])?;
        url.query_pairs_mut().append_pair("token", token);
        self.send(self.request(Method::GET, url, false)?).await
    }

    pub async fn health_check(&self) -> Result<ApiResponse<String>> {
        let url = self.endpoint(&["auth", "health"])?;
        self.send(self.request(Method::GET, url, false)?).await
    }

    // Files

    pub async fn upload_file(&self, source: &UploadSource) -> Result<FileRecord> {
        if source.bytes.is_empty() {
            return Err(Error::validation(format!(
                "File '{}' is empty",
                source.file_name
            )));
        }

        let part = Part::bytes(source.bytes.clone())
            .file_name(source.file_name.clone())
            .mime_str(&source.content_type)
            .map_err(|_| {
                Error::validation(format!("Invalid content type '{}'", source.content_type))
            })?;
        let form = Form::new().part("file", part);

        let url = self.endpoint(&["files", "upload"])?;
        let builder = self.request(Method::POST, url, true)?.multipart(form);
        let data = self.send::<FileData>(builder).await?.into_data()?;
        self.to_record(data)
    }

    pub async fn list_my_files(&self) -> Result<Vec<FileRecord>> {
        let url = self.endpoint(&["files", "my-files"])?;
        let files = self
            .send::<Vec<FileData>>(self.request(Method::GET, url, true)?)
            .await?
            .into_data()?;
        self.to_records(files)
    }

    pub async fn list_my_files_by_type(&self, file_type: FileType) -> Result<Vec<FileRecord>> {
        let url = self.endpoint(&["files", "my-files", file_type.as_str()])?;
        let files = self
            .send::<Vec<FileData>>(self.request(Method::GET, url, true)?)
            .await?
            .into_data()?;
        self.to_records(files)
    }

    pub async fn delete_file(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["files", id])?;
        self.send::<serde_json::Value>(self.request(Method::DELETE, url, true)?)
            .await?
            .into_result()?;
        Ok(())
    }

    pub async fn get_file_info(&self, id: &str) -> Result<FileRecord> {
        let url = self.endpoint(&["files", "info", id])?;
        let data = self
            .send::<FileData>(self.request(Method::GET, url, true)?)
            .await?
            .into_data()?;
        self.to_record(data)
    }

    pub async fn rename_file(&self, id: &str, new_name: &str) -> Result<FileRecord> {
        let mut url = self.endpoint(&["files", id, "rename"])?;
        url.query_pairs_mut().append_pair("newFileName", new_name);
        let data = self
            .send::<FileData>(self.request(Method::PUT, url, true)?)
            .await?
            .into_data()?;
        self.to_record(data)
    }

    /// Link that serves the file as an attachment. The token travels in the
    /// query string because the link is opened without headers.
    pub fn download_url(&self, id: &str) -> Result<Url> {
        self.tokenized_url(&["files", "download", id])
    }

    /// Link that serves the file inline.
    pub fn preview_url(&self, id: &str) -> Result<Url> {
        self.tokenized_url(&["files", "preview", id])
    }

    fn tokenized_url(&self, segments: &[&str]) -> Result<Url> {
        let token = self.require_token()?;
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    /// Fetches the raw bytes behind [`ApiClient::download_url`].
    pub async fn download(&self, id: &str) -> Result<Vec<u8>> {
        let url = self.download_url(id)?;
        let response = self.dispatch(self.request(Method::GET, url, false)?).await?;
        let bytes = response.bytes().await.map_err(|e| {
            warn!(error = %e, "download interrupted");
            Error::request_failed(NETWORK_ERROR)
        })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FileApi for ApiClient {
    async fn upload_file(&self, source: &UploadSource) -> Result<FileRecord> {
        ApiClient::upload_file(self, source).await
    }

    async fn list_my_files(&self) -> Result<Vec<FileRecord>> {
        ApiClient::list_my_files(self).await
    }

    async fn rename_file(&self, id: &str, new_name: &str) -> Result<FileRecord> {
        ApiClient::rename_file(self, id, new_name).await
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        ApiClient::delete_file(self, id).await
    }
}
