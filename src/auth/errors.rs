use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("No authorization redirect received within {0:?}")]
    Timeout(Duration),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("No stored credentials, interactive authorization required")]
    NotAuthenticated,

    #[error("Invalid client secrets: {0}")]
    ClientSecrets(String),

    #[error("HTTP Request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl AuthError {
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::RefreshFailed(message.into())
    }

    pub fn exchange_failed(message: impl Into<String>) -> Self {
        Self::ExchangeFailed(message.into())
    }
}

/// Error alias
pub type Result<T, E = AuthError> = std::result::Result<T, E>;
