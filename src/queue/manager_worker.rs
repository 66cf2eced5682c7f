use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use crate::auth::CredentialStore;
use crate::upload::{
    ProgressSink,
    TransferDescriptor,
    TransferHandle,
    TransferId,
    TransferOptions,
    TransferOutcome,
    TransferProgress,
    UploadTransfer,
    VideoHost,
};
use super::errors::{QueueError, Result};
use super::types::{QueueCommand, QueueEvent, QueueSnapshot};

/// Forwards transfer progress onto the queue's event channel.
struct EventSink {
    event_tx: broadcast::Sender<QueueEvent>,
}

impl ProgressSink for EventSink {
    fn emit(&self, progress: TransferProgress) {
        let _ = self.event_tx.send(QueueEvent::Progress(progress));
    }
}

struct ActiveTransfer {
    descriptor: TransferDescriptor,
    handle: TransferHandle,
    join_handle: JoinHandle<()>,
}

/// Owns the pending sequence and the active slot. Every command and every
/// completion is handled on this one task, which serializes all mutations.
pub struct QueueWorker {
    credentials: Arc<CredentialStore>,
    host: Arc<dyn VideoHost>,
    options: TransferOptions,
    pending: VecDeque<TransferDescriptor>,
    active: Option<ActiveTransfer>,

    event_tx: broadcast::Sender<QueueEvent>,
    snapshot_tx: watch::Sender<QueueSnapshot>,
    completion_rx: mpsc::UnboundedReceiver<TransferId>,
    completion_tx: mpsc::UnboundedSender<TransferId>,
}

impl QueueWorker {
    pub(crate) async fn run(
        credentials: Arc<CredentialStore>,
        host: Arc<dyn VideoHost>,
        options: TransferOptions,
        mut command_rx: mpsc::Receiver<QueueCommand>,
        event_tx: broadcast::Sender<QueueEvent>,
        snapshot_tx: watch::Sender<QueueSnapshot>,
    ) {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            credentials,
            host,
            options,
            pending: VecDeque::new(),
            active: None,
            event_tx,
            snapshot_tx,
            completion_rx,
            completion_tx,
        };

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => {
                        if !worker.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        worker.stop().await;
                        break;
                    }
                },
                Some(id) = worker.completion_rx.recv() => {
                    worker.handle_completion(id).await;
                }
            }
        }

        tracing::debug!("Queue worker stopped");
    }

    /// Returns `false` once the worker should stop.
    async fn handle_command(&mut self, command: QueueCommand) -> bool {
        match command {
            QueueCommand::Submit { descriptor, reply } => {
                let _ = reply.send(self.submit(descriptor));
            }
            QueueCommand::CancelCurrent { reply } => {
                let _ = reply.send(self.cancel_current());
            }
            QueueCommand::CancelAllPending { reply } => {
                let _ = reply.send(self.cancel_all_pending());
            }
            QueueCommand::CancelSpecific { id, reply } => {
                let _ = reply.send(self.cancel_specific(id));
            }
            QueueCommand::CancelAll { reply } => {
                self.cancel_current();
                self.cancel_all_pending();
                let _ = reply.send(());
            }
            QueueCommand::Shutdown { reply } => {
                self.stop().await;
                let _ = reply.send(());
                return false;
            }
        }

        true
    }

    fn submit(&mut self, descriptor: TransferDescriptor) -> Result<TransferId> {
        let id = descriptor.id;
        let is_active = self.active.as_ref().is_some_and(|active| active.descriptor.id == id);
        if is_active || self.pending.iter().any(|queued| queued.id == id) {
            return Err(QueueError::DuplicateId(id));
        }

        tracing::info!(%id, title = %descriptor.display_title, "Queued upload");
        self.pending.push_back(descriptor);
        self.notify();
        self.drain();

        Ok(id)
    }

    /// Starts the head of the queue unless a transfer is already active.
    fn drain(&mut self) {
        if self.active.is_some() {
            return;
        }
        let Some(descriptor) = self.pending.pop_front() else {
            return;
        };

        let id = descriptor.id;
        let transfer = UploadTransfer::new(
            descriptor.clone(),
            self.credentials.clone(),
            self.host.clone(),
            self.options.clone(),
        );
        let handle = transfer.handle();
        let sink = EventSink { event_tx: self.event_tx.clone() };
        let completion_tx = self.completion_tx.clone();

        let join_handle = tokio::spawn(async move {
            match transfer.run(&sink).await {
                Ok(TransferOutcome::Succeeded { video_id }) => {
                    tracing::debug!(%id, %video_id, "Transfer finished");
                }
                Ok(TransferOutcome::Canceled) => {
                    tracing::debug!(%id, "Transfer canceled");
                }
                Err(err) => {
                    tracing::debug!(%id, error = %err, "Transfer failed");
                }
            }
            let _ = completion_tx.send(id);
        });

        self.active = Some(ActiveTransfer {
            descriptor,
            handle,
            join_handle,
        });
        self.notify();
    }

    async fn handle_completion(&mut self, id: TransferId) {
        let is_current = self.active.as_ref().is_some_and(|active| active.descriptor.id == id);
        if !is_current {
            return;
        }
        let Some(finished) = self.active.take() else {
            return;
        };

        if let Err(err) = finished.join_handle.await {
            tracing::error!(%id, error = %err, "Transfer task panicked");
        }

        self.notify();
        self.drain();
    }

    fn cancel_current(&mut self) -> bool {
        match &self.active {
            Some(active) => {
                tracing::info!(id = %active.descriptor.id, "Canceling active upload");
                active.handle.cancel();
                true
            }
            None => false,
        }
    }

    fn cancel_all_pending(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        let removed: Vec<_> = self.pending.drain(..).collect();
        for descriptor in &removed {
            let _ = self.event_tx.send(QueueEvent::Progress(TransferProgress::canceled_before_start(descriptor)));
        }
        tracing::info!(count = removed.len(), "Canceled pending uploads");
        self.notify();

        removed.len()
    }

    fn cancel_specific(&mut self, id: TransferId) -> bool {
        let is_active = self.active.as_ref().is_some_and(|active| active.descriptor.id == id);
        if is_active {
            return self.cancel_current();
        }

        let Some(index) = self.pending.iter().position(|descriptor| descriptor.id == id) else {
            return false;
        };

        if let Some(descriptor) = self.pending.remove(index) {
            tracing::info!(%id, "Canceled pending upload");
            let _ = self.event_tx.send(QueueEvent::Progress(TransferProgress::canceled_before_start(&descriptor)));
            self.notify();
        }

        true
    }

    async fn stop(&mut self) {
        self.cancel_current();
        self.cancel_all_pending();

        if let Some(active) = self.active.take() {
            if let Err(err) = active.join_handle.await {
                tracing::error!(id = %active.descriptor.id, error = %err, "Transfer task panicked");
            }
            self.notify();
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.iter().cloned().collect(),
            active: self.active.as_ref().map(|active| active.descriptor.id),
        }
    }

    /// Publishes the current composition. Called exactly once after every mutation.
    ///
    /// The event goes out before the watch value changes, so anyone woken by
    /// `wait_idle` can already receive every event up to that point.
    fn notify(&self) {
        let snapshot = self.snapshot();
        let _ = self.event_tx.send(QueueEvent::Changed(snapshot.clone()));
        self.snapshot_tx.send_replace(snapshot);
    }
}
