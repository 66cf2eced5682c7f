mod errors;
mod manager;
mod manager_worker;
pub mod types;

pub use errors::{QueueError, Result};
pub use manager::{QueueManager, QueueManagerHandle};
pub use types::{QueueEvent, QueueSnapshot};
