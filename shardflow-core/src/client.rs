//! The seam to the remote streaming service.

use chrono::{DateTime, Utc};

use crate::checkpoint::ShardPosition;
use crate::error::Result;
use crate::message::{Record, ShardId};

/// [StreamClient] backed by the AWS Kinesis connector.
pub mod kinesis;

/// Opaque handle to a per-shard iteration position on the remote service.
/// Handles are short-lived server-side; an expired handle must be
/// re-created from the owning checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IteratorHandle(String);

impl IteratorHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        IteratorHandle(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One fetch worth of records plus the continuation handle. A missing
/// continuation means the shard is closed upstream and fully consumed.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub records: Vec<Record>,
    pub next_iterator: Option<IteratorHandle>,
}

/// Remote operations the reader needs from the streaming service.
///
/// Every implementation classifies its failures into the crate taxonomy:
/// retryable conditions as [crate::Error::TransientService], expired
/// handles as [crate::Error::ExpiredIterator], and unrecoverable ones as
/// [crate::Error::FatalShard] or [crate::Error::Setup]. All calls are
/// expected to complete within a short, bounded timeout.
#[trait_variant::make(StreamClient: Send)]
pub trait LocalStreamClient: Clone + Sync {
    /// Enumerate the stream's shards.
    async fn list_shards(&self, stream: &str) -> Result<Vec<ShardId>>;

    /// Create an iteration handle for one shard at the given position.
    async fn shard_iterator(
        &self,
        stream: &str,
        shard_id: &ShardId,
        position: &ShardPosition,
    ) -> Result<IteratorHandle>;

    /// Fetch the next batch of records behind `iterator`.
    async fn read_batch(
        &self,
        shard_id: &ShardId,
        iterator: &IteratorHandle,
    ) -> Result<RecordBatch>;

    /// Approximate bytes written to the stream since `since`. Used as a lag
    /// signal, not for correctness.
    async fn backlog_bytes(&self, stream: &str, since: DateTime<Utc>) -> Result<i64>;
}
