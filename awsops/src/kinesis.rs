//! Kinesis stream tailing.
//!
//! Every shard gets its own task reading from a `LATEST` iterator. Records are
//! forwarded over an mpsc channel so the caller decides how to print them.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_kinesis::Client;
use aws_sdk_kinesis::types::ShardIteratorType;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescription {
    pub arn: String,
    pub status: String,
    pub shard_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub sequence_number: String,
    pub partition_key: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPage {
    pub records: Vec<StreamRecord>,
    /// `None` once the shard is closed and fully read.
    pub next_iterator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailedRecord {
    pub shard_id: String,
    pub record: StreamRecord,
}

impl TailedRecord {
    pub fn data_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.record.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailSettings {
    pub record_limit: i32,
    /// Pause between reads of one shard; a shard allows 5 reads per second.
    pub poll_interval: Duration,
}

impl Default for TailSettings {
    fn default() -> Self {
        Self {
            record_limit: 10,
            poll_interval: Duration::from_millis(1_000),
        }
    }
}

#[async_trait]
pub trait StreamClient: Send + Sync {
    async fn describe_stream(&self, stream: &str) -> Result<StreamDescription>;

    async fn latest_iterator(&self, stream: &str, shard_id: &str) -> Result<Option<String>>;

    async fn get_records(&self, shard_iterator: &str, limit: i32) -> Result<RecordPage>;
}

#[async_trait]
impl StreamClient for Client {
    async fn describe_stream(&self, stream: &str) -> Result<StreamDescription> {
        let mut shard_ids = Vec::new();
        let mut exclusive_start: Option<String> = None;

        loop {
            let out = self
                .describe_stream()
                .stream_name(stream)
                .set_exclusive_start_shard_id(exclusive_start.take())
                .send()
                .await
                .with_context(|| format!("describing Kinesis stream {stream}"))?;

            let desc = out
                .stream_description()
                .ok_or_else(|| anyhow!("no description returned for stream {stream}"))?;

            shard_ids.extend(desc.shards().iter().map(|s| s.shard_id().to_string()));

            if desc.has_more_shards() {
                exclusive_start = shard_ids.last().cloned();
                continue;
            }

            return Ok(StreamDescription {
                arn: desc.stream_arn().to_string(),
                status: desc.stream_status().as_str().to_string(),
                shard_ids,
            });
        }
    }

    async fn latest_iterator(&self, stream: &str, shard_id: &str) -> Result<Option<String>> {
        let out = self
            .get_shard_iterator()
            .stream_name(stream)
            .shard_id(shard_id)
            .shard_iterator_type(ShardIteratorType::Latest)
            .send()
            .await
            .with_context(|| format!("getting LATEST iterator for shard {shard_id}"))?;

        Ok(out.shard_iterator().map(|s| s.to_string()))
    }

    async fn get_records(&self, shard_iterator: &str, limit: i32) -> Result<RecordPage> {
        let out = self
            .get_records()
            .shard_iterator(shard_iterator)
            .limit(limit)
            .send()
            .await
            .map_err(|e| e.into_service_error())
            .context("getting Kinesis records")?;

        Ok(RecordPage {
            records: out
                .records()
                .iter()
                .map(|r| StreamRecord {
                    sequence_number: r.sequence_number().to_string(),
                    partition_key: r.partition_key().to_string(),
                    data: r.data().as_ref().to_vec(),
                })
                .collect(),
            next_iterator: out.next_shard_iterator().map(|s| s.to_string()),
        })
    }
}

/// Tail every shard until shutdown, or until every shard is closed. Returns
/// the first shard error after all shard tasks have stopped.
pub async fn tail_stream<C>(
    client: Arc<C>,
    stream: &str,
    shard_ids: &[String],
    settings: TailSettings,
    shutdown: watch::Receiver<bool>,
    records: mpsc::Sender<TailedRecord>,
) -> Result<()>
where
    C: StreamClient + ?Sized + 'static,
{
    let stream: Arc<str> = Arc::from(stream);
    let mut join = JoinSet::new();
    for shard_id in shard_ids {
        join.spawn(tail_shard(
            client.clone(),
            stream.clone(),
            shard_id.clone(),
            settings,
            shutdown.clone(),
            records.clone(),
        ));
    }
    drop(records);

    let mut first_err = None;
    while let Some(res) = join.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "shard tail failed");
                first_err.get_or_insert(e);
            }
            Err(e) => error!(error = ?e, "shard task join error"),
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn tail_shard<C>(
    client: Arc<C>,
    stream: Arc<str>,
    shard_id: String,
    settings: TailSettings,
    mut shutdown: watch::Receiver<bool>,
    records: mpsc::Sender<TailedRecord>,
) -> Result<()>
where
    C: StreamClient + ?Sized,
{
    let Some(mut iterator) = client.latest_iterator(&stream, &shard_id).await? else {
        warn!(shard = %shard_id, "no iterator returned; skipping shard");
        return Ok(());
    };

    loop {
        if *shutdown.borrow() {
            break;
        }

        let page = client
            .get_records(&iterator, settings.record_limit)
            .await
            .with_context(|| format!("reading shard {shard_id}"))?;

        debug!(shard = %shard_id, count = page.records.len(), "records");
        for record in page.records {
            let tailed = TailedRecord {
                shard_id: shard_id.clone(),
                record,
            };
            if records.send(tailed).await.is_err() {
                // nobody is listening any more
                return Ok(());
            }
        }

        match page.next_iterator {
            Some(next) => iterator = next,
            None => {
                info!(shard = %shard_id, "shard closed");
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(settings.poll_interval) => {}
            Ok(()) = shutdown.changed() => {}
        }
    }

    Ok(())
}
