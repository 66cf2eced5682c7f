use tokio::sync::oneshot;
use crate::upload::{TransferDescriptor, TransferId, TransferProgress};
use super::errors::Result;

/// Queue composition after a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Transfers waiting to run, in submission order
    pub pending: Vec<TransferDescriptor>,
    /// The transfer currently executing
    pub active: Option<TransferId>,
}

impl QueueSnapshot {
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn has_active_or_pending(&self) -> bool {
        self.is_active() || !self.pending.is_empty()
    }

    pub fn pending_ids(&self) -> Vec<TransferId> {
        self.pending.iter().map(|descriptor| descriptor.id).collect()
    }
}

#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// Pending sequence or active flag changed
    Changed(QueueSnapshot),

    /// Progress of a running transfer, or the cancellation of a pending one
    Progress(TransferProgress),
}

pub enum QueueCommand {
    Submit {
        descriptor: TransferDescriptor,
        reply: oneshot::Sender<Result<TransferId>>,
    },

    CancelCurrent {
        reply: oneshot::Sender<bool>,
    },

    CancelAllPending {
        reply: oneshot::Sender<usize>,
    },

    CancelSpecific {
        id: TransferId,
        reply: oneshot::Sender<bool>,
    },

    CancelAll {
        reply: oneshot::Sender<()>,
    },

    /// Cancel everything, wait for the active transfer, then stop
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
