//! In-memory queue used by the drain tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use awsops::error::QueueError;
use awsops::sqs::{DeleteEntry, DeleteOutcome, FailedDelete, Message, QueueClient, ReceiveRequest};

pub const QUEUE_URL: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/task-queue-dlq-dev";

pub fn message(i: usize) -> Message {
    Message {
        message_id: format!("msg-{i}"),
        receipt_handle: format!("rh-{i}"),
        body: Some(format!("{{\"n\":{i}}}")),
        attributes: BTreeMap::new(),
        message_attributes: BTreeMap::new(),
    }
}

#[derive(Default)]
struct State {
    visible: VecDeque<Message>,
    queues: HashMap<String, String>,
    receive_errors: VecDeque<QueueError>,
    /// 1-based receive call number -> error
    scheduled_errors: HashMap<usize, QueueError>,
    delete_calls: Vec<Vec<DeleteEntry>>,
    /// id -> sender_fault
    failing_deletes: HashMap<String, bool>,
    /// ids that fail on the first delete attempt only
    flaky_deletes: HashSet<String>,
    redeliver_kept: bool,
}

/// Receives pop from `visible`; a received message stays hidden until it is
/// deleted, unless `redeliver_kept` puts it straight back (a visibility
/// timeout that always lapses before the next receive).
#[derive(Default)]
pub struct FakeQueue {
    state: Mutex<State>,
    receive_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    receive_delay: Duration,
}

impl FakeQueue {
    pub fn with_messages(n: usize) -> Self {
        let q = Self::default();
        {
            let mut s = q.state.lock().unwrap();
            s.visible.extend((0..n).map(message));
            s.queues.insert("task-queue-dlq-dev".into(), QUEUE_URL.into());
        }
        q
    }

    pub fn with_receive_delay(mut self, delay: Duration) -> Self {
        self.receive_delay = delay;
        self
    }

    pub fn fail_receive(&self, err: QueueError) {
        self.state.lock().unwrap().receive_errors.push_back(err);
    }

    pub fn fail_receive_on_call(&self, call: usize, err: QueueError) {
        self.state.lock().unwrap().scheduled_errors.insert(call, err);
    }

    pub fn fail_delete(&self, id: &str, sender_fault: bool) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(id.to_string(), sender_fault);
    }

    pub fn fail_delete_once(&self, id: &str) {
        self.state.lock().unwrap().flaky_deletes.insert(id.to_string());
    }

    pub fn redeliver_kept(&self) {
        self.state.lock().unwrap().redeliver_kept = true;
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> Vec<Vec<DeleteEntry>> {
        self.state.lock().unwrap().delete_calls.clone()
    }

    pub fn visible(&self) -> usize {
        self.state.lock().unwrap().visible.len()
    }
}

#[async_trait]
impl QueueClient for FakeQueue {
    async fn resolve_queue_url(&self, queue_name: &str) -> Result<String, QueueError> {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(queue_name)
            .cloned()
            .ok_or_else(|| QueueError::NotFound(queue_name.to_string()))
    }

    async fn receive_messages(
        &self,
        _queue_url: &str,
        request: &ReceiveRequest,
    ) -> Result<Vec<Message>, QueueError> {
        let call = self.receive_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.receive_delay.is_zero() {
            tokio::time::sleep(self.receive_delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        let result = {
            let mut s = self.state.lock().unwrap();
            let scripted = s.scheduled_errors.remove(&call);
            match scripted.or_else(|| s.receive_errors.pop_front()) {
                Some(e) => Err(e),
                None => {
                    let n = (request.max_messages as usize).min(s.visible.len());
                    let batch: Vec<Message> = s.visible.drain(..n).collect();
                    if s.redeliver_kept {
                        s.visible.extend(batch.iter().cloned());
                    }
                    Ok(batch)
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete_messages(
        &self,
        _queue_url: &str,
        entries: &[DeleteEntry],
    ) -> Result<DeleteOutcome, QueueError> {
        let mut s = self.state.lock().unwrap();
        s.delete_calls.push(entries.to_vec());

        let mut outcome = DeleteOutcome::default();
        for e in entries {
            if let Some(sender_fault) = s.failing_deletes.get(&e.id).copied() {
                outcome.failed.push(FailedDelete {
                    id: e.id.clone(),
                    code: if sender_fault { "ReceiptHandleIsInvalid" } else { "InternalError" }.into(),
                    message: None,
                    sender_fault,
                });
            } else if s.flaky_deletes.remove(&e.id) {
                outcome.failed.push(FailedDelete {
                    id: e.id.clone(),
                    code: "InternalError".into(),
                    message: None,
                    sender_fault: false,
                });
            } else {
                outcome.deleted.push(e.id.clone());
            }
        }
        Ok(outcome)
    }
}
