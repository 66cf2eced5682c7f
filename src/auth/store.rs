use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;
use super::credentials::Credentials;
use super::errors::{AuthError, Result};
use super::provider::{ClientSecrets, OAuthProvider, TokenResponse};
use super::redirect::RedirectListener;

pub const DEFAULT_REDIRECT_PORT: u16 = 52719;
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(300);

/// Parameters of the browser consent flow.
#[derive(Debug, Clone)]
pub struct InteractiveAuth {
    pub secrets: ClientSecrets,
    pub redirect_port: u16,
    pub timeout: Duration,
    pub open_browser: bool,
}

impl InteractiveAuth {
    pub fn new(secrets: ClientSecrets) -> Self {
        Self {
            secrets,
            redirect_port: DEFAULT_REDIRECT_PORT,
            timeout: DEFAULT_AUTH_TIMEOUT,
            open_browser: true,
        }
    }
}

/// Owner of the persisted OAuth2 credentials.
///
/// All mutations go through [`CredentialStore::ensure_fresh`],
/// [`CredentialStore::acquire_interactively`] or [`CredentialStore::persist`],
/// each of which rewrites the whole record on disk.
pub struct CredentialStore {
    path: PathBuf,
    provider: Arc<dyn OAuthProvider>,
    current: Mutex<Option<Credentials>>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, provider: Arc<dyn OAuthProvider>) -> Self {
        Self {
            path: path.into(),
            provider,
            current: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads persisted credentials. Absent or corrupt files yield `None`.
    pub async fn load(&self) -> Option<Credentials> {
        let path = self.path.clone();
        let loaded = tokio::task::spawn_blocking(move || Credentials::read_from(&path))
            .await
            .ok()
            .flatten();

        *self.current.lock().await = loaded.clone();
        loaded
    }

    /// Atomically replaces the stored record and makes it current.
    pub async fn persist(&self, credentials: &Credentials) -> Result<()> {
        let mut guard = self.current.lock().await;
        self.write(credentials).await?;
        *guard = Some(credentials.clone());
        Ok(())
    }

    /// Returns usable credentials, refreshing and persisting them first when
    /// the access token is missing or expired.
    pub async fn ensure_fresh(&self) -> Result<Credentials> {
        let mut guard = self.current.lock().await;
        let credentials = guard.as_ref().ok_or(AuthError::NotAuthenticated)?;

        if !credentials.is_expired() {
            return Ok(credentials.clone());
        }

        if credentials.refresh_token.is_none() {
            return Err(AuthError::refresh_failed("no refresh token available"));
        }

        tracing::info!("Access token expired, refreshing");
        let token = self.provider
            .refresh(credentials)
            .await
            .map_err(|err| match err {
                AuthError::RefreshFailed(_) => err,
                other => AuthError::refresh_failed(other.to_string()),
            })?;

        // Current first: a caller dropped mid-write must not refresh again.
        let refreshed = apply_token(credentials.clone(), token);
        *guard = Some(refreshed.clone());
        self.write(&refreshed).await?;

        Ok(refreshed)
    }

    /// Runs the browser consent flow: opens the authorization URL, waits for
    /// the loopback redirect, then exchanges the code for a token set.
    pub async fn acquire_interactively(&self, auth: &InteractiveAuth) -> Result<Credentials> {
        let listener = RedirectListener::bind(auth.redirect_port).await?;
        self.complete_authorization(listener, auth).await
    }

    /// Consent flow against an already bound redirect listener.
    pub async fn complete_authorization(&self, listener: RedirectListener, auth: &InteractiveAuth) -> Result<Credentials> {
        let redirect_uri = listener.redirect_uri()?;
        let state = Uuid::new_v4().simple().to_string();
        let url = self.provider.authorization_url(&auth.secrets.client_id, &redirect_uri, &state)?;

        tracing::info!(%url, "Sign in to the account videos should be uploaded to");
        if auth.open_browser {
            if let Err(err) = webbrowser::open(url.as_str()) {
                tracing::warn!(error = %err, "Could not open a browser, visit the URL above manually");
            }
        }

        let code = listener.wait_for_code(Some(&state), auth.timeout).await?;
        let token = self.provider.exchange_code(&auth.secrets, &code, &redirect_uri).await?;

        let credentials = apply_token(Credentials {
            access_token: None,
            refresh_token: None,
            expiry_date: 0,
            client_id: auth.secrets.client_id.clone(),
            client_secret: auth.secrets.client_secret.clone(),
            redirect_uri,
        }, token);

        self.persist(&credentials).await?;
        tracing::info!(path = %self.path.display(), "Stored new credentials");

        Ok(credentials)
    }

    /// Loads stored credentials and refreshes them when expired. Returns
    /// `true` when nothing usable is stored and the consent flow must run.
    pub async fn needs_consent(&self) -> bool {
        match self.load().await {
            None => true,
            Some(credentials) if credentials.is_expired() => match self.ensure_fresh().await {
                Ok(_) => false,
                Err(err) => {
                    tracing::warn!(error = %err, "Stored credentials cannot be refreshed");
                    true
                }
            },
            Some(_) => false,
        }
    }

    /// Usable credentials from disk, falling back to the consent flow when
    /// none are stored or they can no longer be refreshed.
    pub async fn authorize(&self, auth: &InteractiveAuth) -> Result<Credentials> {
        if self.needs_consent().await {
            return self.acquire_interactively(auth).await;
        }
        self.ensure_fresh().await
    }

    async fn write(&self, credentials: &Credentials) -> Result<()> {
        let path = self.path.clone();
        let credentials = credentials.clone();
        tokio::task::spawn_blocking(move || credentials.write_to(&path))
            .await
            .map_err(|err| AuthError::Io(std::io::Error::other(err)))?
    }
}

fn apply_token(mut credentials: Credentials, token: TokenResponse) -> Credentials {
    credentials.access_token = Some(token.access_token);
    if token.refresh_token.is_some() {
        credentials.refresh_token = token.refresh_token;
    }
    credentials.expiry_date = Utc::now().timestamp_millis() + token.expires_in * 1000;
    credentials
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use url::Url;
    use super::*;

    #[derive(Default)]
    struct CountingProvider {
        refreshes: AtomicUsize,
        exchanges: AtomicUsize,
        reject: bool,
        last_state: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl OAuthProvider for CountingProvider {
        fn authorization_url(&self, client_id: &str, redirect_uri: &str, state: &str) -> Result<Url> {
            *self.last_state.lock().unwrap() = Some(state.to_string());
            Ok(Url::parse_with_params("https://auth.invalid/consent", &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("state", state),
            ])?)
        }

        async fn exchange_code(&self, _secrets: &ClientSecrets, code: &str, _redirect_uri: &str) -> Result<TokenResponse> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            Ok(TokenResponse {
                access_token: format!("access-for-{}", code),
                expires_in: 3600,
                refresh_token: Some("refresh".to_string()),
                scope: None,
                token_type: Some("Bearer".to_string()),
            })
        }

        async fn refresh(&self, _credentials: &Credentials) -> Result<TokenResponse> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(AuthError::refresh_failed("status 400: invalid_grant"));
            }
            Ok(TokenResponse {
                access_token: "fresh".to_string(),
                expires_in: 3599,
                refresh_token: None,
                scope: None,
                token_type: None,
            })
        }
    }

    fn expired() -> Credentials {
        Credentials {
            access_token: Some("stale".to_string()),
            refresh_token: Some("refresh".to_string()),
            expiry_date: Utc::now().timestamp_millis() - 1_000,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://127.0.0.1:52719".to_string(),
        }
    }

    #[tokio::test]
    async fn test_expired_credentials_refresh_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        expired().write_to(&path).unwrap();

        let provider = Arc::new(CountingProvider::default());
        let store = CredentialStore::new(&path, provider.clone());
        assert!(store.load().await.is_some());

        let before = Utc::now().timestamp_millis();
        let refreshed = store.ensure_fresh().await.unwrap();
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(refreshed.access_token.as_deref(), Some("fresh"));
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh"));
        assert!(refreshed.expiry_date > before);

        // Persisted and reused without another exchange.
        assert_eq!(Credentials::read_from(&path).unwrap(), refreshed);
        store.ensure_fresh().await.unwrap();
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"), Arc::new(CountingProvider::default()));
        store.persist(&Credentials { refresh_token: None, ..expired() }).await.unwrap();

        let err = store.ensure_fresh().await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(_)));
    }

    #[tokio::test]
    async fn test_rejected_refresh_keeps_stored_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let provider = Arc::new(CountingProvider { reject: true, ..Default::default() });
        let store = CredentialStore::new(&path, provider);
        store.persist(&expired()).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        let err = store.ensure_fresh().await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(_)));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_refreshed_record_is_current_when_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        let path = sub.join("token.json");
        let provider = Arc::new(CountingProvider::default());
        let store = CredentialStore::new(&path, provider.clone());
        store.persist(&expired()).await.unwrap();

        std::fs::remove_dir_all(&sub).unwrap();
        std::fs::write(&sub, "not a directory").unwrap();

        assert!(matches!(store.ensure_fresh().await, Err(AuthError::Io(_))));
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);

        let current = store.ensure_fresh().await.unwrap();
        assert_eq!(current.access_token.as_deref(), Some("fresh"));
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_needs_consent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let provider = Arc::new(CountingProvider::default());
        let store = CredentialStore::new(&path, provider.clone());
        assert!(store.needs_consent().await);

        Credentials { refresh_token: None, ..expired() }.write_to(&path).unwrap();
        assert!(store.needs_consent().await);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);

        expired().write_to(&path).unwrap();
        assert!(!store.needs_consent().await);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(Credentials::read_from(&path).unwrap().access_token.as_deref(), Some("fresh"));

        // Fresh record on disk: no refresh needed.
        assert!(!store.needs_consent().await);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);

        let revoked = CredentialStore::new(&path, Arc::new(CountingProvider { reject: true, ..Default::default() }));
        expired().write_to(&path).unwrap();
        assert!(revoked.needs_consent().await);
    }

    #[tokio::test]
    async fn test_no_credentials_is_not_authenticated() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"), Arc::new(CountingProvider::default()));
        assert!(store.load().await.is_none());
        assert!(matches!(store.ensure_fresh().await, Err(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_interactive_flow_exchanges_code_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let provider = Arc::new(CountingProvider::default());
        let store = Arc::new(CredentialStore::new(&path, provider.clone()));

        let listener = RedirectListener::bind(0).await.unwrap();
        let redirect_uri = listener.redirect_uri().unwrap();
        let auth = InteractiveAuth {
            secrets: ClientSecrets { client_id: "id".to_string(), client_secret: "secret".to_string() },
            redirect_port: 0,
            timeout: Duration::from_secs(10),
            open_browser: false,
        };

        let flow = tokio::spawn({
            let store = store.clone();
            async move { store.complete_authorization(listener, &auth).await }
        });

        let state = loop {
            if let Some(state) = provider.last_state.lock().unwrap().clone() {
                break state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        reqwest::get(format!("{}/?code=abc&state={}", redirect_uri, state)).await.unwrap();

        let credentials = flow.await.unwrap().unwrap();
        assert_eq!(credentials.access_token.as_deref(), Some("access-for-abc"));
        assert_eq!(credentials.redirect_uri, redirect_uri);
        assert!(!credentials.is_expired());
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 1);
        assert_eq!(Credentials::read_from(&path).unwrap(), credentials);
    }
}
