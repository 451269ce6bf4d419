//! Concurrent SQS drain.
//!
//! A [`DrainCoordinator`] fans out `concurrency` independent [`Poller`]s
//! against one queue URL and collects their [`PollerReport`]s once every one
//! of them has stopped. Pollers share nothing but the client and the shutdown
//! receiver; each decides on its own when the queue looks empty.

mod coordinator;
mod poller;
pub mod state;

pub use coordinator::{DrainCoordinator, DrainReport};
pub use poller::{Poller, PollerReport};
pub use state::Termination;

use crate::error::QueueError;
use crate::retry::RetryPolicy;
use crate::sqs::QueueClient;

/// What a poller does after disposing of a non-empty batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DrainMode {
    /// Stop after the first non-empty batch.
    #[default]
    OneBatch,
    /// Keep receiving until the empty-receive threshold is hit.
    UntilEmpty,
}

#[derive(Debug, Clone)]
pub struct DrainSettings {
    pub concurrency: usize,
    /// Leave messages on the queue instead of deleting them.
    pub keep_messages: bool,
    pub mode: DrainMode,
    pub wait_secs: Option<i32>,
    pub retry: RetryPolicy,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            keep_messages: false,
            mode: DrainMode::OneBatch,
            wait_secs: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Resolve a queue name. A missing queue is fatal and not retried.
pub async fn resolve_queue<C: QueueClient + ?Sized>(
    client: &C,
    queue_name: &str,
) -> Result<String, QueueError> {
    client.resolve_queue_url(queue_name).await
}
