use thiserror::Error;
use crate::auth::AuthError;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Server error: status code {status_code}, message: {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    /// The video exists remotely but could not be added to its playlist.
    #[error("Video {video_id} uploaded but playlist association failed: {message}")]
    Finalize {
        video_id: String,
        message: String,
    },

    #[error("HTTP Request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload was cancelled")]
    Cancelled,
}

impl UploadError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer(message.into())
    }

    /// True when the upload itself went through and only the finalize step failed.
    pub fn is_partial_success(&self) -> bool {
        matches!(self, Self::Finalize { .. })
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
