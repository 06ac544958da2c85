//! Login, registration and password recovery on top of [`ApiClient`].
//!
//! Everything that can be checked locally is checked before a request is
//! made, and a `success: false` reply becomes [`Error::RequestFailed`].

use tracing::info;

use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::models::RegisterRequest;
use crate::session::{Session, SessionStore};
use crate::view::ViewController;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Logs in, persists the session and hands the token to `api`.
pub async fn login(
    api: &mut ApiClient,
    store: &SessionStore,
    email: &str,
    password: &str,
) -> Result<Session> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(Error::validation("Email and password are required"));
    }

    let auth = api.login(email, password).await?.into_data()?;
    let session = Session::from_auth(auth);
    store.save(&session)?;
    api.set_token(session.token.clone());

    info!(email = %session.email, "logged in");
    Ok(session)
}

pub fn validate_registration(profile: &RegisterRequest) -> Result<()> {
    let email = profile.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::validation("A valid email address is required"));
    }
    if profile.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    if profile.password != profile.confirm_password {
        return Err(Error::validation("Passwords do not match"));
    }
    Ok(())
}

/// Returns the server's confirmation message.
pub async fn register(api: &ApiClient, profile: &RegisterRequest) -> Result<String> {
    validate_registration(profile)?;
    let response = api.register(profile).await?;
    let message = response.message.clone();
    response.into_result()?;
    Ok(message)
}

pub async fn forgot_password(api: &ApiClient, email: &str) -> Result<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(Error::validation("Email is required"));
    }
    let response = api.forgot_password(email).await?;
    let message = response.message.clone();
    response.into_result()?;
    Ok(message)
}

pub async fn reset_password(
    api: &ApiClient,
    token: &str,
    new_password: &str,
    confirm_password: &str,
) -> Result<String> {
    if token.trim().is_empty() {
        return Err(Error::validation("Reset token is missing"));
    }
    if new_password != confirm_password {
        return Err(Error::validation("Passwords do not match"));
    }

    let response = api
        .reset_password(token.trim(), new_password, confirm_password)
        .await?;
    let message = response.message.clone();
    response.into_result()?;
    Ok(message)
}

/// `Ok(Err(message))` means the server answered and rejected the token.
pub async fn validate_reset_token(
    api: &ApiClient,
    token: &str,
) -> Result<std::result::Result<String, String>> {
    if token.trim().is_empty() {
        return Err(Error::validation("Reset token is missing"));
    }
    let response = api.validate_reset_token(token.trim()).await?;
    if response.success {
        Ok(Ok(response.message))
    } else {
        Ok(Err(response.message))
    }
}

/// Forgets the token and lets the controller drop the stored session.
pub fn logout(api: &mut ApiClient, controller: &mut ViewController) -> Result<()> {
    api.clear_token();
    controller.on_logout()?;
    info!("logged out");
    Ok(())
}
