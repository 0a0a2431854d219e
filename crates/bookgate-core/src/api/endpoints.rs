//! Payloads and the trait for the authentication, registration and identity
//! endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, Credential, Identity, Role};

use super::ApiError;

/// Login endpoint path
pub const LOGIN_PATH: &str = "/api/auth/login";

/// Registration endpoint path
pub const REGISTER_PATH: &str = "/api/auth/register";

/// Identity endpoint path
pub const USER_INFO_PATH: &str = "/api/auth/user-info";

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 20;
const PASSWORD_MIN_LEN: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: &str, password: &str) -> Result<Self, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidInput(
                "Username and password required".to_string(),
            ));
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub token: String,
}

/// New account details. Registration never logs the user in.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl RegisterRequest {
    /// Check the payload against the server's own constraints before any I/O.
    pub fn validate(&self) -> Result<(), AuthError> {
        let username_len = self.username.chars().count();
        if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username_len) {
            return Err(AuthError::InvalidInput(format!(
                "Username must be between {} and {} characters",
                USERNAME_MIN_LEN, USERNAME_MAX_LEN
            )));
        }
        if self.username.trim() != self.username {
            return Err(AuthError::InvalidInput(
                "Username must not start or end with whitespace".to_string(),
            ));
        }
        if self.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(AuthError::InvalidInput(format!(
                "Password must be at least {} characters",
                PASSWORD_MIN_LEN
            )));
        }
        if !is_plausible_email(&self.email) {
            return Err(AuthError::InvalidInput("Email address is not valid".to_string()));
        }
        Ok(())
    }
}

fn is_plausible_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.is_empty()
                && !email.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

/// Server acknowledgement: `{"success": true, "message": "..."}`
#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    #[serde(default)]
    pub message: Option<String>,
}

/// The external endpoints the session store depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange username and password for a credential. Public call.
    async fn authenticate(&self, request: &LoginRequest) -> Result<Credential, ApiError>;

    /// Create an account. Public call; returns the server's message, if any.
    async fn register(&self, request: &RegisterRequest) -> Result<Option<String>, ApiError>;

    /// Fetch the identity behind the session's current credential.
    async fn fetch_identity(&self) -> Result<Identity, ApiError>;
}
