mod credentials;
mod errors;
mod provider;
mod redirect;
mod store;

pub use credentials::Credentials;
pub use errors::{AuthError, Result};
pub use provider::{
    ClientSecrets,
    GoogleOAuth,
    OAuthProvider,
    TokenResponse,
    GOOGLE_AUTH_URL,
    GOOGLE_TOKEN_URL,
    YOUTUBE_SCOPES,
};
pub use redirect::RedirectListener;
pub use store::{CredentialStore, InteractiveAuth, DEFAULT_AUTH_TIMEOUT, DEFAULT_REDIRECT_PORT};
