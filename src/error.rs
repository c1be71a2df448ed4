//! Error types for the vdrive crate.

use thiserror::Error;

/// Errors that can occur when interacting with the remote drive.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Failed to read credentials file {path}: {source}")]
    CredentialsFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON: {0}")]
    CredentialsParseError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid URL or ID: {0}")]
    InvalidUrlOrId(String),

    #[error("{operation}: {target} not found")]
    NotFound {
        operation: &'static str,
        target: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{operation} failed for {target}: {source}")]
    Remote {
        operation: &'static str,
        target: String,
        #[source]
        source: Box<DriveError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JWT encoding error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),
}

impl DriveError {
    pub fn not_found(operation: &'static str, target: impl Into<String>) -> Self {
        DriveError::NotFound {
            operation,
            target: target.into(),
        }
    }

    /// Attach the attempted operation and its target to a remote failure.
    ///
    /// `NotFound`, `InvalidInput` and errors that already carry context are
    /// returned unchanged.
    pub fn context(self, operation: &'static str, target: impl Into<String>) -> Self {
        match self {
            DriveError::NotFound { .. }
            | DriveError::InvalidInput(_)
            | DriveError::Remote { .. } => self,
            other => DriveError::Remote {
                operation,
                target: target.into(),
                source: Box::new(other),
            },
        }
    }

    /// True when the remote reported that the addressed object does not exist.
    pub fn is_remote_not_found(&self) -> bool {
        match self {
            DriveError::ApiError { status, .. } => *status == 404,
            DriveError::Remote { source, .. } => source.is_remote_not_found(),
            _ => false,
        }
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
