use chrono::{DateTime, Utc};

use shardflow_kinesis::source::{KinesisRecord, KinesisStream, StartPosition};

use crate::checkpoint::ShardPosition;
use crate::client::{IteratorHandle, RecordBatch, StreamClient};
use crate::error::{Error, Result};
use crate::message::{Record, SequenceNumber, ShardId};

impl From<&ShardPosition> for StartPosition {
    fn from(position: &ShardPosition) -> Self {
        match position {
            ShardPosition::TrimHorizon => StartPosition::TrimHorizon,
            ShardPosition::Latest => StartPosition::Latest,
            ShardPosition::At(seq) => StartPosition::AtSequenceNumber(seq.as_str().to_string()),
            ShardPosition::After(seq) => {
                StartPosition::AfterSequenceNumber(seq.as_str().to_string())
            }
        }
    }
}

impl From<shardflow_kinesis::Error> for Error {
    fn from(value: shardflow_kinesis::Error) -> Self {
        match value {
            shardflow_kinesis::Error::Kinesis(e) => classify_kinesis(e),
            // backlog is the only CloudWatch consumer and it is advisory;
            // every CloudWatch failure is worth retrying
            shardflow_kinesis::Error::CloudWatch(e) => Error::TransientService(e.to_string()),
            shardflow_kinesis::Error::Timeout(_) => Error::TransientService(value.to_string()),
            shardflow_kinesis::Error::ActorTaskTerminated(_) => {
                Error::ActorPatternRecv(value.to_string())
            }
            shardflow_kinesis::Error::InvalidConfig(msg) => Error::Config(msg),
            shardflow_kinesis::Error::Other(msg) => Error::FatalShard(msg),
        }
    }
}

/// Sorts the service's error surface into the retryability taxonomy. The
/// service signals throttling and capacity pressure with dedicated errors;
/// everything not known to be unrecoverable is treated as retryable, so an
/// unclassified network hiccup degrades into "no progress" instead of
/// failing the read.
fn classify_kinesis(err: aws_sdk_kinesis::Error) -> Error {
    use aws_sdk_kinesis::Error as KinesisError;
    match &err {
        KinesisError::ExpiredIteratorException(e) => {
            Error::ExpiredIterator(e.to_string())
        }
        KinesisError::ProvisionedThroughputExceededException(_)
        | KinesisError::LimitExceededException(_)
        | KinesisError::KmsThrottlingException(_) => Error::TransientService(err.to_string()),
        KinesisError::ResourceNotFoundException(_)
        | KinesisError::InvalidArgumentException(_) => Error::FatalShard(err.to_string()),
        _ => Error::TransientService(err.to_string()),
    }
}

fn into_record(shard_id: &ShardId, record: KinesisRecord) -> Record {
    Record {
        shard_id: shard_id.clone(),
        partition_key: record.partition_key,
        payload: record.payload,
        sequence_number: SequenceNumber::new(record.sequence_number),
        arrival_time: record.arrival_time,
    }
}

impl StreamClient for KinesisStream {
    async fn list_shards(&self, stream: &str) -> Result<Vec<ShardId>> {
        let shard_ids = KinesisStream::list_shards(self, stream).await?;
        Ok(shard_ids.into_iter().map(ShardId::new).collect())
    }

    async fn shard_iterator(
        &self,
        stream: &str,
        shard_id: &ShardId,
        position: &ShardPosition,
    ) -> Result<IteratorHandle> {
        let handle = KinesisStream::get_shard_iterator(
            self,
            stream,
            shard_id.as_str(),
            position.into(),
        )
        .await?;
        Ok(IteratorHandle::new(handle))
    }

    async fn read_batch(
        &self,
        shard_id: &ShardId,
        iterator: &IteratorHandle,
    ) -> Result<RecordBatch> {
        let batch = KinesisStream::get_records(self, iterator.as_str().to_string()).await?;
        Ok(RecordBatch {
            records: batch
                .records
                .into_iter()
                .map(|record| into_record(shard_id, record))
                .collect(),
            next_iterator: batch.next_iterator.map(IteratorHandle::new),
        })
    }

    async fn backlog_bytes(&self, stream: &str, since: DateTime<Utc>) -> Result<i64> {
        Ok(KinesisStream::backlog_bytes(self, stream, since).await?)
    }
}
