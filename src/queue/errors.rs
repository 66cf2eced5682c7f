use thiserror::Error;
use crate::upload::TransferId;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Transfer {0} is already queued or running")]
    DuplicateId(TransferId),

    #[error("Queue manager shut down")]
    ManagerShutdown,
}

/// Error alias
pub type Result<T, E = QueueError> = std::result::Result<T, E>;
