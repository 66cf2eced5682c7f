use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::sync::watch;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use crate::auth::CredentialStore;
use super::client::VideoHost;
use super::errors::{Result, UploadError};
use super::progress_stream::ProgressStream;
use super::types::{
    ProgressSink,
    TransferDescriptor,
    TransferId,
    TransferOptions,
    TransferOutcome,
    TransferProgress,
    TransferStatus,
};

/// Cancels one transfer from outside its execution path.
#[derive(Debug, Clone)]
pub struct TransferHandle {
    id: TransferId,
    cancellation_token: CancellationToken,
}

impl TransferHandle {
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Idempotent; a no-op once the transfer has finished.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// Mutable state, written only by the transfer's own `run`.
#[derive(Debug)]
struct TransferState {
    status: TransferStatus,
    bytes_sent: u64,
    percent: f64,
    stream_started: Option<Instant>,
    last_emit: Option<Instant>,
}

/// Drives one file upload through
/// `pending → authorizing → transferring → finalizing → succeeded`, escaping
/// to `failed` or `canceled`.
pub struct UploadTransfer {
    descriptor: TransferDescriptor,
    credentials: Arc<CredentialStore>,
    host: Arc<dyn VideoHost>,
    options: TransferOptions,
    cancellation_token: CancellationToken,
    state: TransferState,
}

impl UploadTransfer {
    pub fn new(
        descriptor: TransferDescriptor,
        credentials: Arc<CredentialStore>,
        host: Arc<dyn VideoHost>,
        options: TransferOptions,
    ) -> Self {
        Self {
            descriptor,
            credentials,
            host,
            options,
            cancellation_token: CancellationToken::new(),
            state: TransferState {
                status: TransferStatus::Pending,
                bytes_sent: 0,
                percent: 0.0,
                stream_started: None,
                last_emit: None,
            },
        }
    }

    pub fn id(&self) -> TransferId {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &TransferDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> TransferStatus {
        self.state.status
    }

    pub fn handle(&self) -> TransferHandle {
        TransferHandle {
            id: self.descriptor.id,
            cancellation_token: self.cancellation_token.clone(),
        }
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Runs the transfer to a terminal status. Cancellation is reported as
    /// `Ok(TransferOutcome::Canceled)`, not as an error.
    pub async fn run(mut self, sink: &dyn ProgressSink) -> Result<TransferOutcome> {
        let span = tracing::info_span!(
            "transfer",
            id = %self.descriptor.id,
            title = %self.descriptor.display_title,
        );

        async move {
            tracing::info!(path = %self.descriptor.source_path.display(), "Starting upload");
            let result = self.drive(sink).await;

            match result {
                Ok(video_id) => {
                    self.state.bytes_sent = self.descriptor.declared_total_size_bytes;
                    self.state.percent = 100.0;
                    self.enter(TransferStatus::Succeeded, sink);
                    tracing::info!(%video_id, "Upload succeeded");
                    Ok(TransferOutcome::Succeeded { video_id })
                }
                Err(UploadError::Cancelled) => {
                    self.enter(TransferStatus::Canceled, sink);
                    tracing::info!(bytes_sent = self.state.bytes_sent, "Upload canceled");
                    Ok(TransferOutcome::Canceled)
                }
                Err(err) => {
                    self.state.status = TransferStatus::Failed;
                    sink.emit(self.snapshot(Some(err.to_string())));
                    tracing::error!(error = %err, partial = err.is_partial_success(), "Upload failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, sink: &dyn ProgressSink) -> Result<String> {
        let token = self.cancellation_token.clone();
        if token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        self.enter(TransferStatus::Authorizing, sink);
        let credentials = cancellable(&token, self.credentials.ensure_fresh()).await?;
        let access_token = credentials
            .access_token
            .ok_or_else(|| UploadError::transfer("credentials carry no access token"))?;
        let channel = cancellable(&token, self.host.whoami(&access_token)).await?;
        tracing::debug!(%channel, "Credentials accepted");

        self.enter(TransferStatus::Transferring, sink);
        self.state.stream_started = Some(Instant::now());
        let video_id = self.stream_file(&token, &access_token, sink).await?;

        self.enter(TransferStatus::Finalizing, sink);
        if let Some(playlist_id) = self.descriptor.target_playlist_id.clone() {
            let associate = self.host.add_to_playlist(&access_token, &playlist_id, &video_id);
            match cancellable(&token, associate).await {
                Ok(()) => tracing::debug!(%playlist_id, "Added to playlist"),
                Err(UploadError::Cancelled) => return Err(UploadError::Cancelled),
                Err(err) => {
                    tracing::warn!(%playlist_id, %video_id, error = %err, "Playlist association failed");
                    return Err(UploadError::Finalize {
                        video_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        Ok(video_id)
    }

    async fn stream_file(
        &mut self,
        token: &CancellationToken,
        access_token: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let file = cancellable(token, File::open(&self.descriptor.source_path)).await?;
        let (progress_tx, mut progress_rx) = watch::channel(0u64);
        let body = ProgressStream::new(
            ReaderStream::with_capacity(file, self.options.chunk_size),
            progress_tx,
        );

        let host = self.host.clone();
        let descriptor = self.descriptor.clone();
        let privacy = self.options.privacy_status;
        let upload = async move {
            host.upload_video(access_token, &descriptor, privacy, Box::pin(body)).await
        };
        tokio::pin!(upload);

        let mut progress_open = true;
        let video_id = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(UploadError::Cancelled),
                result = &mut upload => break result?,
                changed = progress_rx.changed(), if progress_open => {
                    match changed {
                        Ok(()) => {
                            let sent = *progress_rx.borrow_and_update();
                            self.record_bytes(sent, sink, false);
                        }
                        Err(_) => progress_open = false,
                    }
                }
            }
        };

        let sent = *progress_rx.borrow();
        self.record_bytes(sent, sink, true);

        Ok(video_id)
    }

    fn enter(&mut self, status: TransferStatus, sink: &dyn ProgressSink) {
        tracing::debug!(from = %self.state.status, to = %status, "Transfer state change");
        self.state.status = status;
        self.state.last_emit = Some(Instant::now());
        sink.emit(self.snapshot(None));
    }

    /// Records a byte count reported by the body stream. Counts past the
    /// declared size are clamped so progress never exceeds 100% and never
    /// goes backwards.
    fn record_bytes(&mut self, sent: u64, sink: &dyn ProgressSink, force: bool) {
        let total = self.descriptor.declared_total_size_bytes;
        let clamped = sent.min(total).max(self.state.bytes_sent);
        self.state.bytes_sent = clamped;
        self.state.percent = percent_of(clamped, total);

        let due = match self.state.last_emit {
            Some(last) => last.elapsed() >= self.options.progress_interval,
            None => true,
        };
        if force || due {
            self.state.last_emit = Some(Instant::now());
            sink.emit(self.snapshot(None));
        }
    }

    fn snapshot(&self, error: Option<String>) -> TransferProgress {
        let total = self.descriptor.declared_total_size_bytes;
        let elapsed = self.state
            .stream_started
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let throughput = if elapsed > 0.0 {
            self.state.bytes_sent as f64 / elapsed
        } else {
            0.0
        };
        let eta = if throughput > 0.0 && !self.state.status.is_terminal() {
            let remaining = total.saturating_sub(self.state.bytes_sent) as f64;
            Some(Duration::from_secs_f64(remaining / throughput))
        } else {
            None
        };

        TransferProgress {
            id: self.descriptor.id,
            status: self.state.status,
            percent: self.state.percent,
            bytes_done: self.state.bytes_sent,
            total_bytes: total,
            throughput,
            eta,
            error,
        }
    }
}

fn percent_of(bytes: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (bytes as f64 / total as f64 * 100.0).min(100.0)
}

/// Resolves to `Cancelled` as soon as `token` fires, dropping `future`.
async fn cancellable<F, T, E>(token: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<UploadError>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(UploadError::Cancelled),
        result = future => result.map_err(Into::into),
    }
}
