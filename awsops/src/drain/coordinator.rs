use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::{DrainSettings, Poller, PollerReport};
use crate::error::QueueError;
use crate::sqs::{FailedDelete, Message, QueueClient};

/// Fans out pollers against one queue and waits for all of them.
pub struct DrainCoordinator<C: ?Sized> {
    client: Arc<C>,
    settings: DrainSettings,
}

impl<C> DrainCoordinator<C>
where
    C: QueueClient + ?Sized + 'static,
{
    pub fn new(client: Arc<C>, settings: DrainSettings) -> Self {
        Self { client, settings }
    }

    /// Run `concurrency` pollers to completion. A failing poller does not
    /// cancel the others; its error lands in the report.
    pub async fn drain(&self, queue_url: &str, shutdown: watch::Receiver<bool>) -> DrainReport {
        let queue_url: Arc<str> = Arc::from(queue_url);
        let concurrency = self.settings.concurrency.max(1);

        info!(
            queue_url = %queue_url,
            concurrency,
            keep = self.settings.keep_messages,
            mode = ?self.settings.mode,
            "starting pollers"
        );

        let mut join = JoinSet::new();
        for index in 0..concurrency {
            let poller = Poller::new(
                index,
                self.client.clone(),
                queue_url.clone(),
                &self.settings,
                shutdown.clone(),
            );
            join.spawn(poller.run());
        }

        let mut pollers = Vec::with_capacity(concurrency);
        let mut panicked = 0;
        while let Some(res) = join.join_next().await {
            match res {
                Ok(report) => pollers.push(report),
                Err(e) => {
                    error!(error = ?e, "poller task join error");
                    panicked += 1;
                }
            }
        }
        pollers.sort_by_key(|r| r.index);

        DrainReport {
            queue_url: queue_url.to_string(),
            pollers,
            panicked,
        }
    }
}

/// Everything the pollers did, assembled after the last one stopped.
#[derive(Debug)]
pub struct DrainReport {
    pub queue_url: String,
    pub pollers: Vec<PollerReport>,
    /// Poller tasks that panicked and left no report.
    pub panicked: usize,
}

impl DrainReport {
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.pollers.iter().flat_map(|p| p.messages.iter())
    }

    pub fn message_count(&self) -> usize {
        self.pollers.iter().map(|p| p.messages.len()).sum()
    }

    pub fn deleted_ids(&self) -> impl Iterator<Item = &str> {
        self.pollers
            .iter()
            .flat_map(|p| p.deleted.iter().map(String::as_str))
    }

    pub fn failed_deletes(&self) -> impl Iterator<Item = &FailedDelete> {
        self.pollers.iter().flat_map(|p| p.failed_deletes.iter())
    }

    /// (poller index, error) for every poller that stopped on an error.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &QueueError)> {
        self.pollers
            .iter()
            .filter_map(|p| p.outcome.as_ref().err().map(|e| (p.index, e)))
    }

    pub fn receive_count(&self) -> u32 {
        self.pollers.iter().map(|p| p.receives).sum()
    }

    pub fn is_success(&self) -> bool {
        self.panicked == 0 && self.errors().next().is_none()
    }
}
