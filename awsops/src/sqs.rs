use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::operation::get_queue_url::GetQueueUrlError;
use aws_sdk_sqs::types::{DeleteMessageBatchRequestEntry, MessageSystemAttributeName};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::QueueError;

/// SQS never returns more than this many messages per receive.
pub const MAX_BATCH_SIZE: i32 = 10;

/// A received message, detached from the SDK types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    #[serde(skip)]
    pub receipt_handle: String,
    pub body: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub message_attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeValue {
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
}

impl Message {
    pub fn delete_entry(&self) -> DeleteEntry {
        DeleteEntry {
            id: self.message_id.clone(),
            receipt_handle: self.receipt_handle.clone(),
        }
    }
}

/// One entry of a batch delete. `id` is the message id, which SQS accepts as
/// a batch entry id and which keeps results traceable to messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEntry {
    pub id: String,
    pub receipt_handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelete {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
    /// True when SQS blames the request itself; such entries are not retried.
    pub sender_fault: bool,
}

/// Per-entry result of a batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<FailedDelete>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_messages: i32,
    pub wait_secs: Option<i32>,
}

impl Default for ReceiveRequest {
    fn default() -> Self {
        Self {
            max_messages: MAX_BATCH_SIZE,
            wait_secs: None,
        }
    }
}

/// The slice of the SQS API the drain needs.
#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn resolve_queue_url(&self, queue_name: &str) -> Result<String, QueueError>;

    /// Long-poll receive of up to `request.max_messages` with all attributes.
    async fn receive_messages(
        &self,
        queue_url: &str,
        request: &ReceiveRequest,
    ) -> Result<Vec<Message>, QueueError>;

    async fn delete_messages(
        &self,
        queue_url: &str,
        entries: &[DeleteEntry],
    ) -> Result<DeleteOutcome, QueueError>;
}

#[async_trait]
impl QueueClient for Client {
    async fn resolve_queue_url(&self, queue_name: &str) -> Result<String, QueueError> {
        let out = self
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(GetQueueUrlError::QueueDoesNotExist(_)) => {
                    QueueError::NotFound(queue_name.to_string())
                }
                _ => QueueError::from_sdk("GetQueueUrl", e),
            })?;

        out.queue_url()
            .map(|s| s.to_string())
            .ok_or_else(|| QueueError::Malformed {
                operation: "GetQueueUrl",
                message: format!("queue url missing for {queue_name}"),
            })
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        request: &ReceiveRequest,
    ) -> Result<Vec<Message>, QueueError> {
        let out = self
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(request.max_messages)
            .set_wait_time_seconds(request.wait_secs)
            // all user attributes + all system attributes
            .message_attribute_names("All")
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("ReceiveMessage", e))?;

        out.messages.unwrap_or_default().into_iter().map(from_sdk_message).collect()
    }

    async fn delete_messages(
        &self,
        queue_url: &str,
        entries: &[DeleteEntry],
    ) -> Result<DeleteOutcome, QueueError> {
        if entries.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        let sdk_entries = entries
            .iter()
            .map(|e| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(&e.id)
                    .receipt_handle(&e.receipt_handle)
                    .build()
                    .map_err(|err| QueueError::InvalidRequest {
                        operation: "DeleteMessageBatch",
                        message: err.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let out = self
            .delete_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(sdk_entries))
            .send()
            .await
            .map_err(|e| QueueError::from_sdk("DeleteMessageBatch", e))?;

        Ok(DeleteOutcome {
            deleted: out.successful().iter().map(|s| s.id().to_string()).collect(),
            failed: out
                .failed()
                .iter()
                .map(|f| FailedDelete {
                    id: f.id().to_string(),
                    code: f.code().to_string(),
                    message: f.message().map(|m| m.to_string()),
                    sender_fault: f.sender_fault(),
                })
                .collect(),
        })
    }
}

fn from_sdk_message(m: aws_sdk_sqs::types::Message) -> Result<Message, QueueError> {
    let missing = |field: &str| QueueError::Malformed {
        operation: "ReceiveMessage",
        message: format!("message without {field}"),
    };

    let message_id = m.message_id.ok_or_else(|| missing("message_id"))?;
    let receipt_handle = m.receipt_handle.ok_or_else(|| missing("receipt_handle"))?;

    let attributes = m
        .attributes
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k.as_str().to_string(), v))
        .collect();

    let message_attributes = m
        .message_attributes
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let value = AttributeValue {
                data_type: v.data_type().to_string(),
                string_value: v.string_value().map(|s| s.to_string()),
            };
            (k, value)
        })
        .collect();

    Ok(Message {
        message_id,
        receipt_handle,
        body: m.body,
        attributes,
        message_attributes,
    })
}

/// Every queue URL in the account, following pagination.
pub async fn list_queue_urls(client: &Client) -> anyhow::Result<Vec<String>> {
    use anyhow::Context;

    let mut urls = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let out = client
            .list_queues()
            .set_next_token(next_token.take())
            .send()
            .await
            .context("listing SQS queues")?;

        urls.extend(out.queue_urls().iter().cloned());

        match out.next_token() {
            Some(token) => next_token = Some(token.to_string()),
            None => break,
        }
    }
    Ok(urls)
}
