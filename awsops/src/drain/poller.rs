use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::DrainSettings;
use super::state::{Action, Event, PollerPolicy, PollerState, Termination, transition};
use crate::error::QueueError;
use crate::retry::{RetryPolicy, with_backoff};
use crate::shutdown::sleep_unless_stopped;
use crate::sqs::{DeleteEntry, DeleteOutcome, FailedDelete, Message, QueueClient, ReceiveRequest};

/// What one poller did, including the progress it made before any failure.
#[derive(Debug)]
pub struct PollerReport {
    pub index: usize,
    /// Receive calls that returned a response.
    pub receives: u32,
    pub messages: Vec<Message>,
    pub deleted: Vec<String>,
    pub failed_deletes: Vec<FailedDelete>,
    pub outcome: Result<Termination, QueueError>,
}

impl PollerReport {
    fn new(index: usize) -> Self {
        Self {
            index,
            receives: 0,
            messages: Vec::new(),
            deleted: Vec::new(),
            failed_deletes: Vec::new(),
            outcome: Ok(Termination::Cancelled),
        }
    }
}

/// One receive/dispose loop against a queue.
pub struct Poller<C: ?Sized> {
    index: usize,
    client: Arc<C>,
    queue_url: Arc<str>,
    keep_messages: bool,
    request: ReceiveRequest,
    policy: PollerPolicy,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    /// Only populated when keeping messages.
    seen: HashSet<String>,
}

impl<C: QueueClient + ?Sized> Poller<C> {
    pub fn new(
        index: usize,
        client: Arc<C>,
        queue_url: Arc<str>,
        settings: &DrainSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            index,
            client,
            queue_url,
            keep_messages: settings.keep_messages,
            request: ReceiveRequest {
                wait_secs: settings.wait_secs,
                ..ReceiveRequest::default()
            },
            policy: PollerPolicy::new(settings.mode),
            retry: settings.retry,
            shutdown,
            seen: HashSet::new(),
        }
    }

    /// Drive the state machine to termination. Never panics on queue errors;
    /// they end up in [`PollerReport::outcome`].
    pub async fn run(mut self) -> PollerReport {
        let mut report = PollerReport::new(self.index);
        let mut state = PollerState::Polling;
        let mut action = Action::Receive;
        let mut batch: Vec<Message> = Vec::new();

        loop {
            match action {
                Action::Receive => {
                    if *self.shutdown.borrow() {
                        (state, action) = transition(state, Event::ShutdownRequested, &self.policy);
                        continue;
                    }
                    match self.receive().await {
                        Ok(messages) => {
                            report.receives += 1;
                            let received = messages.len();
                            batch = self.unseen(messages);
                            debug!(poller = self.index, received, new = batch.len(), "received");
                            // a batch of redeliveries counts toward the empty streak
                            let event = Event::Received(batch.len());
                            (state, action) = transition(state, event, &self.policy);
                        }
                        Err(e) => {
                            warn!(poller = self.index, error = %e, "receive failed");
                            report.outcome = Err(e);
                            return report;
                        }
                    }
                }
                Action::Dispose => {
                    if let Err(e) = self.dispose(std::mem::take(&mut batch), &mut report).await {
                        warn!(poller = self.index, error = %e, "delete failed");
                        report.outcome = Err(e);
                        return report;
                    }
                    (state, action) = transition(state, Event::Disposed, &self.policy);
                }
                Action::Stop => {
                    let termination = state.termination().unwrap_or(Termination::Cancelled);
                    info!(
                        poller = self.index,
                        receives = report.receives,
                        messages = report.messages.len(),
                        reason = ?termination,
                        "poller finished"
                    );
                    report.outcome = Ok(termination);
                    return report;
                }
            }
        }
    }

    async fn receive(&self) -> Result<Vec<Message>, QueueError> {
        with_backoff(&self.retry, "ReceiveMessage", &self.shutdown, || {
            self.client.receive_messages(&self.queue_url, &self.request)
        })
        .await
    }

    /// Kept messages come back once their visibility timeout lapses; drop
    /// the ones this poller already emitted.
    fn unseen(&mut self, mut messages: Vec<Message>) -> Vec<Message> {
        if self.keep_messages {
            messages.retain(|m| self.seen.insert(m.message_id.clone()));
        }
        messages
    }

    async fn dispose(
        &self,
        batch: Vec<Message>,
        report: &mut PollerReport,
    ) -> Result<(), QueueError> {
        if self.keep_messages {
            report.messages.extend(batch);
            return Ok(());
        }

        // exported even if the delete below fails
        let entries: Vec<DeleteEntry> = batch.iter().map(Message::delete_entry).collect();
        report.messages.extend(batch);

        let outcome = self.delete(entries).await?;
        if !outcome.failed.is_empty() {
            warn!(
                poller = self.index,
                failed = outcome.failed.len(),
                deleted = outcome.deleted.len(),
                "some messages could not be deleted"
            );
        }
        report.deleted.extend(outcome.deleted);
        report.failed_deletes.extend(outcome.failed);
        Ok(())
    }

    /// Batch delete. Entries that fail without sender fault are retried on
    /// their own; whatever still fails is returned in `failed`.
    async fn delete(&self, mut pending: Vec<DeleteEntry>) -> Result<DeleteOutcome, QueueError> {
        let mut total = DeleteOutcome::default();
        let mut attempt = 1;

        loop {
            let outcome = with_backoff(&self.retry, "DeleteMessageBatch", &self.shutdown, || {
                self.client.delete_messages(&self.queue_url, &pending)
            })
            .await?;

            total.deleted.extend(outcome.deleted);
            let (retryable, permanent): (Vec<_>, Vec<_>) =
                outcome.failed.into_iter().partition(|f| !f.sender_fault);
            total.failed.extend(permanent);

            if retryable.is_empty() {
                return Ok(total);
            }
            if attempt >= self.retry.max_attempts {
                total.failed.extend(retryable);
                return Ok(total);
            }

            debug!(poller = self.index, count = retryable.len(), attempt, "retrying failed delete entries");
            if !sleep_unless_stopped(self.retry.delay_for(attempt), &self.shutdown).await {
                total.failed.extend(retryable);
                return Ok(total);
            }
            pending.retain(|e| retryable.iter().any(|f| f.id == e.id));
            attempt += 1;
        }
    }
}
