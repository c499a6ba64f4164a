use std::time::Duration;

use aws_sdk_cloudwatch::types::{Dimension, Statistic};
use aws_sdk_kinesis::types::ShardIteratorType;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::{Error, Result, client};

const DEFAULT_BATCH_LIMIT: i32 = 1000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct KinesisSourceConfig {
    pub region: String,
    pub stream_name: String,
    /// Override the AWS endpoint, e.g. for localstack.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Upper bound on records returned by a single fetch.
    #[serde(default)]
    pub batch_limit: Option<i32>,
    /// Per-request timeout in milliseconds.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl KinesisSourceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            return Err(Error::InvalidConfig("region must not be empty".to_string()));
        }
        if self.stream_name.is_empty() {
            return Err(Error::InvalidConfig(
                "stream_name must not be empty".to_string(),
            ));
        }
        if let Some(limit) = self.batch_limit {
            if !(1..=10_000).contains(&limit) {
                return Err(Error::InvalidConfig(format!(
                    "batch_limit must be within 1..=10000, got {limit}"
                )));
            }
        }
        Ok(())
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
    }
}

/// Where a freshly created shard iterator starts.
#[derive(Debug, Clone, PartialEq)]
pub enum StartPosition {
    TrimHorizon,
    Latest,
    AtSequenceNumber(String),
    AfterSequenceNumber(String),
}

/// A single record fetched from one shard.
#[derive(Debug, Clone)]
pub struct KinesisRecord {
    pub partition_key: String,
    pub payload: Bytes,
    pub sequence_number: String,
    /// Approximate server-side arrival timestamp.
    pub arrival_time: DateTime<Utc>,
}

/// One fetch worth of records.
#[derive(Debug, Clone)]
pub struct KinesisRecordBatch {
    pub records: Vec<KinesisRecord>,
    /// Handle for the next fetch; `None` once the shard is closed and
    /// fully consumed.
    pub next_iterator: Option<String>,
    pub millis_behind_latest: Option<i64>,
}

enum KinesisActorMessage {
    ListShards {
        respond_to: oneshot::Sender<Result<Vec<String>>>,
        stream_name: String,
    },
    GetShardIterator {
        respond_to: oneshot::Sender<Result<String>>,
        stream_name: String,
        shard_id: String,
        position: StartPosition,
    },
    GetRecords {
        respond_to: oneshot::Sender<Result<KinesisRecordBatch>>,
        iterator: String,
    },
    BacklogBytes {
        respond_to: oneshot::Sender<Result<i64>>,
        stream_name: String,
        since: DateTime<Utc>,
    },
}

struct KinesisStreamActor {
    handler_rx: mpsc::Receiver<KinesisActorMessage>,
    kinesis: aws_sdk_kinesis::Client,
    cloudwatch: aws_sdk_cloudwatch::Client,
    batch_limit: i32,
    request_timeout: Duration,
}

impl KinesisStreamActor {
    async fn start(
        config: KinesisSourceConfig,
        handler_rx: mpsc::Receiver<KinesisActorMessage>,
        kinesis: Option<aws_sdk_kinesis::Client>,
        cloudwatch: Option<aws_sdk_cloudwatch::Client>,
    ) -> Result<()> {
        let kinesis = match kinesis {
            Some(client) => client,
            None => client::create_kinesis_client(&config).await?,
        };
        let cloudwatch = match cloudwatch {
            Some(client) => client,
            None => client::create_cloudwatch_client(&config).await?,
        };

        // spawn actor
        tokio::spawn(async move {
            let mut actor = KinesisStreamActor {
                handler_rx,
                kinesis,
                cloudwatch,
                batch_limit: config.batch_limit.unwrap_or(DEFAULT_BATCH_LIMIT),
                request_timeout: config.request_timeout(),
            };
            actor.run().await;
        });

        Ok(())
    }

    async fn run(&mut self) {
        while let Some(msg) = self.handler_rx.recv().await {
            self.handle_message(msg).await;
        }
    }

    async fn handle_message(&mut self, msg: KinesisActorMessage) {
        match msg {
            KinesisActorMessage::ListShards {
                respond_to,
                stream_name,
            } => {
                let shards = self.list_shards(stream_name).await;
                let _ = respond_to.send(shards);
            }
            KinesisActorMessage::GetShardIterator {
                respond_to,
                stream_name,
                shard_id,
                position,
            } => {
                let iterator = self.get_shard_iterator(stream_name, shard_id, position).await;
                let _ = respond_to.send(iterator);
            }
            KinesisActorMessage::GetRecords {
                respond_to,
                iterator,
            } => {
                let batch = self.get_records(iterator).await;
                let _ = respond_to.send(batch);
            }
            KinesisActorMessage::BacklogBytes {
                respond_to,
                stream_name,
                since,
            } => {
                let bytes = self.backlog_bytes(stream_name, since).await;
                let _ = respond_to.send(bytes);
            }
        }
    }

    async fn list_shards(&mut self, stream_name: String) -> Result<Vec<String>> {
        let mut shard_ids = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut request = self.kinesis.list_shards();
            // the service rejects requests carrying both a token and a name
            request = match next_token.take() {
                Some(token) => request.next_token(token),
                None => request.stream_name(stream_name.clone()),
            };

            let sdk_response = time::timeout(self.request_timeout, request.send()).await;
            let output = match sdk_response {
                Err(_) => {
                    tracing::error!(stream_name, "Timed out listing shards");
                    return Err(Error::Timeout(self.request_timeout));
                }
                Ok(Err(err)) => {
                    tracing::error!(?err, stream_name, "Failed to list shards");
                    return Err(Error::Kinesis(err.into()));
                }
                Ok(Ok(output)) => output,
            };

            for shard in output.shards() {
                shard_ids.push(shard.shard_id().to_string());
            }
            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        tracing::debug!(stream_name, count = shard_ids.len(), "Listed shards");
        Ok(shard_ids)
    }

    async fn get_shard_iterator(
        &mut self,
        stream_name: String,
        shard_id: String,
        position: StartPosition,
    ) -> Result<String> {
        let mut request = self
            .kinesis
            .get_shard_iterator()
            .stream_name(stream_name.clone())
            .shard_id(shard_id.clone());
        request = match position {
            StartPosition::TrimHorizon => {
                request.shard_iterator_type(ShardIteratorType::TrimHorizon)
            }
            StartPosition::Latest => request.shard_iterator_type(ShardIteratorType::Latest),
            StartPosition::AtSequenceNumber(seq) => request
                .shard_iterator_type(ShardIteratorType::AtSequenceNumber)
                .starting_sequence_number(seq),
            StartPosition::AfterSequenceNumber(seq) => request
                .shard_iterator_type(ShardIteratorType::AfterSequenceNumber)
                .starting_sequence_number(seq),
        };

        let sdk_response = time::timeout(self.request_timeout, request.send()).await;
        let output = match sdk_response {
            Err(_) => {
                tracing::error!(stream_name, shard_id, "Timed out creating shard iterator");
                return Err(Error::Timeout(self.request_timeout));
            }
            Ok(Err(err)) => {
                tracing::error!(?err, stream_name, shard_id, "Failed to create shard iterator");
                return Err(Error::Kinesis(err.into()));
            }
            Ok(Ok(output)) => output,
        };

        output
            .shard_iterator()
            .map(str::to_string)
            .ok_or_else(|| Error::Other("GetShardIterator returned no iterator".to_string()))
    }

    async fn get_records(&mut self, iterator: String) -> Result<KinesisRecordBatch> {
        let request = self
            .kinesis
            .get_records()
            .shard_iterator(iterator)
            .limit(self.batch_limit);

        let sdk_response = time::timeout(self.request_timeout, request.send()).await;
        let output = match sdk_response {
            Err(_) => {
                tracing::error!("Timed out fetching records");
                return Err(Error::Timeout(self.request_timeout));
            }
            Ok(Err(err)) => {
                tracing::error!(?err, "Failed to fetch records");
                return Err(Error::Kinesis(err.into()));
            }
            Ok(Ok(output)) => output,
        };

        let records = output
            .records()
            .iter()
            .map(|record| {
                let arrival_time = record
                    .approximate_arrival_timestamp()
                    .and_then(|ts| ts.to_millis().ok())
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .unwrap_or_else(Utc::now);
                KinesisRecord {
                    partition_key: record.partition_key().to_string(),
                    payload: Bytes::from(record.data().clone().into_inner()),
                    sequence_number: record.sequence_number().to_string(),
                    arrival_time,
                }
            })
            .collect();

        Ok(KinesisRecordBatch {
            records,
            next_iterator: output.next_shard_iterator().map(str::to_string),
            millis_behind_latest: output.millis_behind_latest(),
        })
    }

    /// Sums the stream's incoming-bytes metric since `since`. Spans
    /// shorter than the metric's one-minute resolution report zero.
    async fn backlog_bytes(&mut self, stream_name: String, since: DateTime<Utc>) -> Result<i64> {
        let now = Utc::now();
        let minutes = (now - since).num_minutes();
        if minutes < 1 {
            return Ok(0);
        }
        let period = i32::try_from(minutes.saturating_mul(60)).unwrap_or(i32::MAX);

        let request = self
            .cloudwatch
            .get_metric_statistics()
            .namespace("AWS/Kinesis")
            .metric_name("IncomingBytes")
            .dimensions(
                Dimension::builder()
                    .name("StreamName")
                    .value(stream_name.clone())
                    .build(),
            )
            .start_time(aws_smithy_types::DateTime::from_millis(
                since.timestamp_millis(),
            ))
            .end_time(aws_smithy_types::DateTime::from_millis(now.timestamp_millis()))
            .period(period)
            .statistics(Statistic::Sum);

        let sdk_response = time::timeout(self.request_timeout, request.send()).await;
        let output = match sdk_response {
            Err(_) => {
                tracing::error!(stream_name, "Timed out fetching the incoming-bytes metric");
                return Err(Error::Timeout(self.request_timeout));
            }
            Ok(Err(err)) => {
                tracing::error!(?err, stream_name, "Failed to fetch the incoming-bytes metric");
                return Err(Error::CloudWatch(err.into()));
            }
            Ok(Ok(output)) => output,
        };

        let total: f64 = output
            .datapoints()
            .iter()
            .filter_map(|point| point.sum())
            .sum();
        Ok(total as i64)
    }
}

/// Clone-able handle to the Kinesis stream actor.
#[derive(Clone)]
pub struct KinesisStream {
    actor_tx: mpsc::Sender<KinesisActorMessage>,
}

impl KinesisStream {
    pub async fn new(config: KinesisSourceConfig) -> Result<Self> {
        Self::with_clients(config, None, None).await
    }

    /// Like [KinesisStream::new], with pre-built SDK clients. Used by
    /// tests to point the actor at a replay client.
    pub async fn with_clients(
        config: KinesisSourceConfig,
        kinesis: Option<aws_sdk_kinesis::Client>,
        cloudwatch: Option<aws_sdk_cloudwatch::Client>,
    ) -> Result<Self> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(10);
        KinesisStreamActor::start(config, rx, kinesis, cloudwatch).await?;
        Ok(Self { actor_tx: tx })
    }

    pub async fn list_shards(&self, stream_name: &str) -> Result<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        let msg = KinesisActorMessage::ListShards {
            respond_to: tx,
            stream_name: stream_name.to_string(),
        };
        let _ = self.actor_tx.send(msg).await;
        rx.await.map_err(Error::ActorTaskTerminated)?
    }

    pub async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        position: StartPosition,
    ) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let msg = KinesisActorMessage::GetShardIterator {
            respond_to: tx,
            stream_name: stream_name.to_string(),
            shard_id: shard_id.to_string(),
            position,
        };
        let _ = self.actor_tx.send(msg).await;
        rx.await.map_err(Error::ActorTaskTerminated)?
    }

    pub async fn get_records(&self, iterator: String) -> Result<KinesisRecordBatch> {
        let (tx, rx) = oneshot::channel();
        let msg = KinesisActorMessage::GetRecords {
            respond_to: tx,
            iterator,
        };
        let _ = self.actor_tx.send(msg).await;
        rx.await.map_err(Error::ActorTaskTerminated)?
    }

    pub async fn backlog_bytes(&self, stream_name: &str, since: DateTime<Utc>) -> Result<i64> {
        let (tx, rx) = oneshot::channel();
        let msg = KinesisActorMessage::BacklogBytes {
            respond_to: tx,
            stream_name: stream_name.to_string(),
            since,
        };
        let _ = self.actor_tx.send(msg).await;
        rx.await.map_err(Error::ActorTaskTerminated)?
    }
}
