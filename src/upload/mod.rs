mod client;
mod errors;
mod progress_stream;
mod transfer;
pub mod types;

pub use client::{UploadBody, VideoHost, YouTubeClient, YOUTUBE_API_BASE};
pub use errors::{Result, UploadError};
pub use progress_stream::ProgressStream;
pub use transfer::{TransferHandle, UploadTransfer};
pub use types::{
    PrivacyStatus,
    ProgressSink,
    TransferDescriptor,
    TransferId,
    TransferOptions,
    TransferOutcome,
    TransferProgress,
    TransferStatus,
};
