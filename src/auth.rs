//! Bearer-token acquisition for the Drive API.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{DriveError, Result};
use crate::models::{ServiceAccountCredentials, TokenResponse};

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google Drive API scope.
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Tokens are refreshed this long before they expire.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // OAuth scope
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

/// Where access tokens come from.
#[derive(Debug)]
pub enum Credentials {
    /// Service account key; tokens come from a signed JWT assertion.
    ServiceAccount(ServiceAccountCredentials),
    /// Installed-app OAuth client plus a long-lived refresh token.
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
    /// A short-lived token used as is.
    AccessToken(String),
}

/// Authenticator for Google APIs.
#[derive(Clone)]
pub struct Authenticator {
    credentials: Arc<Credentials>,
    client: Client,
    token_uri: String,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl Authenticator {
    /// Create a new authenticator from a service account JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DriveError::CredentialsFileError {
            path: path.display().to_string(),
            source,
        })?;
        let credentials: ServiceAccountCredentials = serde_json::from_str(&content)?;
        Ok(Self::new(Credentials::ServiceAccount(credentials)))
    }

    /// Create a new authenticator from credentials.
    pub fn new(credentials: Credentials) -> Self {
        let token_uri = match &credentials {
            Credentials::ServiceAccount(sa) => {
                sa.token_uri.clone().unwrap_or_else(|| TOKEN_URI.to_string())
            }
            _ => TOKEN_URI.to_string(),
        };
        Self {
            credentials: Arc::new(credentials),
            client: Client::new(),
            token_uri,
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Authenticator that always hands out `token`.
    pub fn from_access_token(token: impl Into<String>) -> Self {
        Self::new(Credentials::AccessToken(token.into()))
    }

    /// Point token exchanges at a different endpoint.
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        if let Credentials::AccessToken(token) = self.credentials.as_ref() {
            return Ok(token.clone());
        }

        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + EXPIRY_BUFFER {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = self.refresh_token().await?;

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    /// Forget the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        *self.cached_token.write().await = None;
    }

    async fn refresh_token(&self) -> Result<CachedToken> {
        match self.credentials.as_ref() {
            Credentials::ServiceAccount(sa) => {
                let jwt = self.sign_assertion(sa)?;
                let params = [
                    ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                    ("assertion", jwt.as_str()),
                ];
                self.exchange(&params).await
            }
            Credentials::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => {
                let params = [
                    ("grant_type", "refresh_token"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("refresh_token", refresh_token.as_str()),
                ];
                self.exchange(&params).await
            }
            Credentials::AccessToken(token) => Ok(CachedToken {
                access_token: token.clone(),
                expires_at: SystemTime::now() + Duration::from_secs(3600),
            }),
        }
    }

    fn sign_assertion(&self, sa: &ServiceAccountCredentials) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DriveError::AuthenticationError(e.to_string()))?
            .as_secs();

        let claims = Claims {
            iss: sa.client_email.clone(),
            scope: DRIVE_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + 3600, // 1 hour
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(sa.private_key.as_bytes())?;
        Ok(encode(&header, &claims, &key)?)
    }

    /// Post a grant to the token endpoint.
    async fn exchange(&self, params: &[(&str, &str)]) -> Result<CachedToken> {
        debug!(token_uri = %self.token_uri, "requesting access token");

        let response = self
            .client
            .post(&self.token_uri)
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenRefreshError(format!(
                "Status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;

        let expires_at =
            SystemTime::now() + Duration::from_secs(token_response.expires_in.unwrap_or(3600));

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at,
        })
    }
}
