pub mod auth;
pub mod config;
pub mod logging;
pub mod metadata;
pub mod queue;
pub mod upload;

pub use auth::{AuthError, CredentialStore, Credentials, GoogleOAuth, OAuthProvider};
pub use config::Config;
pub use metadata::{MetadataError, MetadataResolver};
pub use queue::{QueueError, QueueEvent, QueueManager, QueueManagerHandle, QueueSnapshot};
pub use upload::{
    TransferDescriptor,
    TransferId,
    TransferProgress,
    TransferStatus,
    UploadError,
    VideoHost,
    YouTubeClient,
};
