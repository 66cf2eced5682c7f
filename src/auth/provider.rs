use std::path::Path;
use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;
use super::credentials::Credentials;
use super::errors::{AuthError, Result};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub const YOUTUBE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube.readonly",
];

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth client identity of this application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parses a Google client secrets document, accepting either an
    /// `installed` or a `web` application section.
    pub fn from_json(data: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(data)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| AuthError::ClientSecrets("expected an `installed` or `web` section".to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|err| AuthError::ClientSecrets(format!("{}: {}", path.display(), err)))?;
        Self::from_json(&data)
    }
}

/// Token endpoint response for both grant types.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Server side of the OAuth2 authorization code flow.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Consent page the user is sent to.
    fn authorization_url(&self, client_id: &str, redirect_uri: &str, state: &str) -> Result<Url>;

    /// Trades an authorization code for a token set.
    async fn exchange_code(&self, secrets: &ClientSecrets, code: &str, redirect_uri: &str) -> Result<TokenResponse>;

    /// Trades the refresh token held in `credentials` for a new access token.
    async fn refresh(&self, credentials: &Credentials) -> Result<TokenResponse>;
}

#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    client: Client,
    auth_url: String,
    token_url: String,
    scopes: Vec<String>,
}

impl GoogleOAuth {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            scopes: YOUTUBE_SCOPES.iter().map(|scope| scope.to_string()).collect(),
        }
    }

    pub fn with_endpoints(mut self, auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self
    }

    async fn post_token_form(&self, params: &[(&str, &str)]) -> std::result::Result<TokenResponse, String> {
        let response = self.client
            .post(&self.token_url)
            .form(params)
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|err| format!("request failed: {}", err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error text".to_string());
            return Err(format!("status {}: {}", status.as_u16(), body));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|err| format!("invalid token response: {}", err))
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuth {
    fn authorization_url(&self, client_id: &str, redirect_uri: &str, state: &str) -> Result<Url> {
        let scope = self.scopes.join(" ");
        let url = Url::parse_with_params(&self.auth_url, &[
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("scope", scope.as_str()),
            ("state", state),
        ])?;

        Ok(url)
    }

    async fn exchange_code(&self, secrets: &ClientSecrets, code: &str, redirect_uri: &str) -> Result<TokenResponse> {
        tracing::debug!(token_url = %self.token_url, "Exchanging authorization code");
        self.post_token_form(&[
            ("code", code),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
        .map_err(AuthError::exchange_failed)
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<TokenResponse> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::refresh_failed("no refresh token available"))?;

        tracing::debug!(token_url = %self.token_url, "Refreshing access token");
        self.post_token_form(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
        .map_err(AuthError::refresh_failed)
    }
}
