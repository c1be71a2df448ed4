//! Drive configuration, built by hand or from the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{Authenticator, Credentials};
use crate::error::{DriveError, Result};

pub const ENV_CLIENT_ID: &str = "GDRIVE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "GDRIVE_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "GDRIVE_REFRESH_TOKEN";
pub const ENV_ACCESS_TOKEN: &str = "GDRIVE_ACCESS_TOKEN";
pub const ENV_SERVICE_ACCOUNT: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const ENV_ROOT_ID: &str = "GDRIVE_ROOT_ID";
pub const ENV_TIMEOUT_SECS: &str = "GDRIVE_TIMEOUT_SECS";

/// How the client authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfig {
    ServiceAccountFile(PathBuf),
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
    AccessToken(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveConfig {
    pub auth: AuthConfig,
    /// Container every virtual path starts from.
    pub root_id: String,
    /// Default per-request timeout.
    pub timeout: Option<Duration>,
}

impl DriveConfig {
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            auth,
            root_id: "root".to_string(),
            timeout: None,
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps variable names to values.
    ///
    /// Precedence: refresh token (needs client id and secret), then access
    /// token, then service account file.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let auth = if let Some(refresh_token) = get(ENV_REFRESH_TOKEN) {
            let client_id =
                get(ENV_CLIENT_ID).ok_or_else(|| DriveError::MissingEnvVar(ENV_CLIENT_ID.into()))?;
            let client_secret = get(ENV_CLIENT_SECRET)
                .ok_or_else(|| DriveError::MissingEnvVar(ENV_CLIENT_SECRET.into()))?;
            AuthConfig::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            }
        } else if let Some(token) = get(ENV_ACCESS_TOKEN) {
            AuthConfig::AccessToken(token)
        } else if let Some(path) = get(ENV_SERVICE_ACCOUNT) {
            AuthConfig::ServiceAccountFile(PathBuf::from(path))
        } else {
            return Err(DriveError::MissingEnvVar(format!(
                "{} or {} or {}",
                ENV_REFRESH_TOKEN, ENV_ACCESS_TOKEN, ENV_SERVICE_ACCOUNT
            )));
        };

        let mut config = Self::new(auth);
        if let Some(root) = get(ENV_ROOT_ID) {
            config.root_id = root;
        }
        if let Some(secs) = get(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                DriveError::InvalidInput(format!("{} must be a number of seconds", ENV_TIMEOUT_SECS))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Build the authenticator described by this configuration.
    pub fn authenticator(&self) -> Result<Authenticator> {
        match &self.auth {
            AuthConfig::ServiceAccountFile(path) => Authenticator::from_file(path),
            AuthConfig::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => Ok(Authenticator::new(Credentials::RefreshToken {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                refresh_token: refresh_token.clone(),
            })),
            AuthConfig::AccessToken(token) => Ok(Authenticator::from_access_token(token.clone())),
        }
    }
}
