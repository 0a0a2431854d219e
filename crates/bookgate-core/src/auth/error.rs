use thiserror::Error;

use crate::api::ApiError;

/// Errors surfaced by session store actions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unauthorized - credential rejected or expired")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("No credential - log in first")]
    NoCredential,

    /// The server refused the request; the message is passed through verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => AuthError::Unauthorized,
            ApiError::AccessDenied(msg) => AuthError::Forbidden(msg),
            ApiError::NetworkError(msg) => AuthError::NetworkFailure(msg),
            ApiError::InvalidResponse(msg) => AuthError::MalformedResponse(msg),
            ApiError::InvalidRequest(msg) => AuthError::InvalidInput(msg),
            ApiError::RateLimited => AuthError::Rejected(ApiError::RateLimited.to_string()),
            ApiError::NotFound(msg)
            | ApiError::ServerError(msg)
            | ApiError::Rejected { message: msg, .. } => AuthError::Rejected(msg),
        }
    }
}
