use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use crate::auth::CredentialStore;
use crate::upload::{TransferDescriptor, TransferId, TransferOptions, VideoHost};
use super::errors::{QueueError, Result};
use super::manager_worker::QueueWorker;
use super::types::{QueueCommand, QueueEvent, QueueSnapshot};

const COMMAND_CAPACITY: usize = 100;
const EVENT_CAPACITY: usize = 1024;

/// Cloneable front end of the upload queue. All calls are forwarded to a
/// single worker task that runs at most one transfer at a time, in
/// submission order.
#[derive(Clone)]
pub struct QueueManager {
    command_tx: mpsc::Sender<QueueCommand>,
    event_tx: broadcast::Sender<QueueEvent>,
    snapshot_rx: watch::Receiver<QueueSnapshot>,
}

/// Queue manager plus its worker task
pub struct QueueManagerHandle {
    pub manager: QueueManager,
    pub worker_handle: JoinHandle<()>,
}

impl QueueManagerHandle {
    /// Cancels everything, waits for the active transfer to stop, then joins the worker.
    pub async fn shutdown(self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.manager.command_tx.send(QueueCommand::Shutdown { reply: reply_tx }).await.is_ok() {
            let _ = reply_rx.await;
        }
        drop(self.manager);

        self.worker_handle.await.map_err(|err| {
            tracing::error!(error = %err, "Queue worker panicked");
            QueueError::ManagerShutdown
        })
    }
}

impl QueueManager {
    /// Spawns the worker task; must be called inside a tokio runtime.
    pub fn new(
        credentials: Arc<CredentialStore>,
        host: Arc<dyn VideoHost>,
        options: TransferOptions,
    ) -> QueueManagerHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(QueueSnapshot::default());

        let worker_handle = tokio::spawn(QueueWorker::run(
            credentials,
            host,
            options,
            command_rx,
            event_tx.clone(),
            snapshot_tx,
        ));

        let manager = Self {
            command_tx,
            event_tx,
            snapshot_rx,
        };

        QueueManagerHandle {
            manager,
            worker_handle,
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> QueueCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| QueueError::ManagerShutdown)?;

        reply_rx
            .await
            .map_err(|_| QueueError::ManagerShutdown)
    }

    /// Appends a transfer to the tail of the queue, starting it right away when idle.
    pub async fn submit(&self, descriptor: TransferDescriptor) -> Result<TransferId> {
        self.request(|reply| QueueCommand::Submit { descriptor, reply }).await?
    }

    /// Cancels the running transfer. Returns whether one was running.
    pub async fn cancel_current(&self) -> Result<bool> {
        self.request(|reply| QueueCommand::CancelCurrent { reply }).await
    }

    /// Drops every waiting transfer, leaving the running one alone.
    /// Returns how many were removed.
    pub async fn cancel_all_pending(&self) -> Result<usize> {
        self.request(|reply| QueueCommand::CancelAllPending { reply }).await
    }

    /// Cancels the running transfer if it has this id, otherwise removes the
    /// id from the waiting transfers. Returns whether the id was found.
    pub async fn cancel_specific(&self, id: TransferId) -> Result<bool> {
        self.request(|reply| QueueCommand::CancelSpecific { id, reply }).await
    }

    pub async fn cancel_all(&self) -> Result<()> {
        self.request(|reply| QueueCommand::CancelAll { reply }).await
    }

    /// True while a transfer runs or waits.
    pub fn has_active_or_pending(&self) -> bool {
        self.snapshot_rx.borrow().has_active_or_pending()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Resolves once nothing runs and nothing waits.
    pub async fn wait_idle(&self) -> Result<()> {
        let mut snapshot_rx = self.snapshot_rx.clone();
        snapshot_rx
            .wait_for(|snapshot| !snapshot.has_active_or_pending())
            .await
            .map(|_| ())
            .map_err(|_| QueueError::ManagerShutdown)
    }

    /// Subscribe to queue and progress events.
    ///
    /// A receiver that falls more than the channel capacity behind gets a
    /// `Lagged` error and skips the missed events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }
}
