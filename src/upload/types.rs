use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Transfer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TransferId(Uuid);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to upload and where it goes. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDescriptor {
    pub id: TransferId,
    pub source_path: PathBuf,
    pub display_title: String,
    pub target_playlist_id: Option<String>,
    pub declared_total_size_bytes: u64,
}

impl TransferDescriptor {
    pub fn new(
        source_path: impl Into<PathBuf>,
        display_title: impl Into<String>,
        target_playlist_id: Option<String>,
        declared_total_size_bytes: u64,
    ) -> Self {
        Self {
            id: TransferId::new(),
            source_path: source_path.into(),
            display_title: display_title.into(),
            target_playlist_id,
            declared_total_size_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Popped from the queue, not started yet
    Pending,
    /// Refreshing credentials and probing the account
    Authorizing,
    /// Streaming the file
    Transferring,
    /// Attaching the uploaded video to its playlist
    Finalizing,
    Succeeded,
    Failed,
    Canceled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Authorizing => "authorizing",
            Self::Transferring => "transferring",
            Self::Finalizing => "finalizing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Immutable progress snapshot of one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub id: TransferId,
    pub status: TransferStatus,
    pub percent: f64,
    pub bytes_done: u64,
    pub total_bytes: u64,
    /// Bytes per second since the stream started
    pub throughput: f64,
    pub eta: Option<Duration>,
    pub error: Option<String>,
}

impl TransferProgress {
    /// Snapshot for a transfer removed from the queue before it started.
    pub fn canceled_before_start(descriptor: &TransferDescriptor) -> Self {
        Self {
            id: descriptor.id,
            status: TransferStatus::Canceled,
            percent: 0.0,
            bytes_done: 0,
            total_bytes: descriptor.declared_total_size_bytes,
            throughput: 0.0,
            eta: None,
            error: None,
        }
    }
}

/// Receiver of progress snapshots.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: TransferProgress);
}

impl ProgressSink for mpsc::UnboundedSender<TransferProgress> {
    fn emit(&self, progress: TransferProgress) {
        let _ = self.send(progress);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    #[default]
    Private,
    Unlisted,
    Public,
}

impl PrivacyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Unlisted => "unlisted",
            Self::Public => "public",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Read size of the file stream
    pub chunk_size: usize,
    /// Minimum gap between intermediate snapshots. Phase-final snapshots are always sent.
    pub progress_interval: Duration,
    pub privacy_status: PrivacyStatus,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: 8 * 1024 * 1024, // 8MB
            progress_interval: Duration::from_millis(250),
            privacy_status: PrivacyStatus::Private,
        }
    }
}

/// How a transfer that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeeded { video_id: String },
    Canceled,
}
