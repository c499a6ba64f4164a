//! Checkpointing: where each shard resumes after a restart.
//!
//! A [CheckpointMark] is the durable unit the host persists. Restarting a
//! reader from a persisted mark never re-delivers the record the mark was
//! taken after; whether records between delivery and persistence are seen
//! again is decided by when the host snapshots (at-least-once either way).

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::StreamClient;
use crate::error::{Error, Result};
use crate::message::{SequenceNumber, ShardId};

/// Where iteration (re)starts within one shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardPosition {
    /// The oldest record the shard still retains.
    TrimHorizon,
    /// Only records published after the iterator is created.
    Latest,
    /// The record with this sequence number, inclusive.
    At(SequenceNumber),
    /// Records published after this sequence number.
    After(SequenceNumber),
}

/// Resume state of a single shard. Immutable; consuming a record produces
/// a new checkpoint via [ShardCheckpoint::moved_past].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardCheckpoint {
    pub shard_id: ShardId,
    pub position: ShardPosition,
}

impl ShardCheckpoint {
    pub fn new(shard_id: ShardId, position: ShardPosition) -> Self {
        Self { shard_id, position }
    }

    /// Checkpoint for the record that follows `seq`.
    pub(crate) fn moved_past(&self, seq: &SequenceNumber) -> Self {
        Self {
            shard_id: self.shard_id.clone(),
            position: ShardPosition::After(seq.clone()),
        }
    }

    /// Whether the record at `seq` was already consumed under this
    /// checkpoint. Iterators re-created from a checkpoint may re-deliver
    /// records at or below it.
    pub(crate) fn is_consumed(&self, seq: &SequenceNumber) -> bool {
        match &self.position {
            ShardPosition::TrimHorizon | ShardPosition::Latest => false,
            ShardPosition::At(checkpointed) => seq < checkpointed,
            ShardPosition::After(checkpointed) => seq <= checkpointed,
        }
    }
}

/// Immutable aggregate of every shard's resume position, one entry per
/// shard the reader consumes. A fresh value is produced on every snapshot;
/// a handed-out mark never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMark {
    shards: Vec<ShardCheckpoint>,
}

impl CheckpointMark {
    pub fn new(shards: Vec<ShardCheckpoint>) -> Self {
        Self { shards }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShardCheckpoint> {
        self.shards.iter()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

/// Produces the initial [CheckpointMark] a reader starts from.
#[trait_variant::make(CheckpointGenerator: Send)]
pub trait LocalCheckpointGenerator<C: StreamClient> {
    async fn generate(&self, client: &C) -> Result<CheckpointMark>;
}

/// Builds a fresh mark by listing the stream's shards and placing every
/// shard at the same starting position.
#[derive(Debug, Clone)]
pub struct ShardListingGenerator {
    stream: String,
    start: ShardPosition,
}

impl ShardListingGenerator {
    pub fn new(stream: impl Into<String>, start: ShardPosition) -> Self {
        Self {
            stream: stream.into(),
            start,
        }
    }
}

impl<C: StreamClient> CheckpointGenerator<C> for ShardListingGenerator {
    async fn generate(&self, client: &C) -> Result<CheckpointMark> {
        let shard_ids = client.list_shards(&self.stream).await.map_err(|e| match e {
            // the caller may retry start() on a transient listing failure
            Error::TransientService(_) => e,
            other => Error::Setup(format!(
                "listing shards of stream {}: {other}",
                self.stream
            )),
        })?;
        if shard_ids.is_empty() {
            return Err(Error::Setup(format!(
                "stream {} has no shards",
                self.stream
            )));
        }
        info!(
            stream = %self.stream,
            shards = shard_ids.len(),
            "Discovered shards for the initial checkpoint"
        );
        Ok(CheckpointMark::new(
            shard_ids
                .into_iter()
                .map(|shard_id| ShardCheckpoint::new(shard_id, self.start.clone()))
                .collect(),
        ))
    }
}

/// Replays a previously persisted mark. This is the restart path: the
/// reader resumes exactly where the persisted mark left off.
#[derive(Debug, Clone)]
pub struct StaticMarkGenerator {
    mark: CheckpointMark,
}

impl StaticMarkGenerator {
    pub fn new(mark: CheckpointMark) -> Self {
        Self { mark }
    }
}

impl<C: StreamClient> CheckpointGenerator<C> for StaticMarkGenerator {
    async fn generate(&self, _client: &C) -> Result<CheckpointMark> {
        Ok(self.mark.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedStreamClient;

    fn seq(s: &str) -> SequenceNumber {
        SequenceNumber::new(s)
    }

    #[test]
    fn test_consumed_after_position() {
        let checkpoint = ShardCheckpoint::new("shard-1".into(), ShardPosition::After(seq("100")));
        assert!(checkpoint.is_consumed(&seq("99")));
        assert!(checkpoint.is_consumed(&seq("100")));
        assert!(!checkpoint.is_consumed(&seq("101")));
    }

    #[test]
    fn test_consumed_at_position() {
        let checkpoint = ShardCheckpoint::new("shard-1".into(), ShardPosition::At(seq("100")));
        assert!(checkpoint.is_consumed(&seq("99")));
        // At is inclusive: the checkpointed record itself is re-delivered
        assert!(!checkpoint.is_consumed(&seq("100")));
        assert!(!checkpoint.is_consumed(&seq("101")));
    }

    #[test]
    fn test_nothing_consumed_from_horizon_or_latest() {
        for position in [ShardPosition::TrimHorizon, ShardPosition::Latest] {
            let checkpoint = ShardCheckpoint::new("shard-1".into(), position);
            assert!(!checkpoint.is_consumed(&seq("1")));
        }
    }

    #[test]
    fn test_moved_past_produces_after() {
        let checkpoint = ShardCheckpoint::new("shard-1".into(), ShardPosition::TrimHorizon);
        let moved = checkpoint.moved_past(&seq("42"));
        assert_eq!(moved.position, ShardPosition::After(seq("42")));
        assert_eq!(moved.shard_id, checkpoint.shard_id);
    }

    #[tokio::test]
    async fn test_shard_listing_generator() {
        let client = ScriptedStreamClient::new();
        client.add_shard("shard-a", vec![]);
        client.add_shard("shard-b", vec![]);

        let generator = ShardListingGenerator::new("events", ShardPosition::TrimHorizon);
        let mark = CheckpointGenerator::generate(&generator, &client).await.unwrap();

        assert_eq!(mark.len(), 2);
        let positions: Vec<_> = mark.iter().cloned().collect();
        assert_eq!(positions[0].shard_id, "shard-a".into());
        assert_eq!(positions[1].shard_id, "shard-b".into());
        assert!(
            positions
                .iter()
                .all(|cp| cp.position == ShardPosition::TrimHorizon)
        );
    }

    #[tokio::test]
    async fn test_shard_listing_generator_wraps_fatal_failures() {
        let client = ScriptedStreamClient::new();
        client.fail_next_list_shards(Error::FatalShard("stream gone".to_string()));

        let generator = ShardListingGenerator::new("events", ShardPosition::TrimHorizon);
        let err = CheckpointGenerator::generate(&generator, &client).await.unwrap_err();
        assert!(matches!(err, Error::Setup(_)));
    }

    #[tokio::test]
    async fn test_shard_listing_generator_propagates_transient_failures() {
        let client = ScriptedStreamClient::new();
        client.fail_next_list_shards(Error::TransientService("throttled".to_string()));

        let generator = ShardListingGenerator::new("events", ShardPosition::TrimHorizon);
        let err = CheckpointGenerator::generate(&generator, &client).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_static_mark_generator_replays_mark() {
        let mark = CheckpointMark::new(vec![ShardCheckpoint::new(
            "shard-a".into(),
            ShardPosition::After(seq("7")),
        )]);
        let generator = StaticMarkGenerator::new(mark.clone());
        let client = ScriptedStreamClient::new();
        assert_eq!(CheckpointGenerator::generate(&generator, &client).await.unwrap(), mark);
    }

    #[test]
    fn test_mark_round_trips_through_serde() {
        let mark = CheckpointMark::new(vec![
            ShardCheckpoint::new("shard-a".into(), ShardPosition::After(seq("100"))),
            ShardCheckpoint::new("shard-b".into(), ShardPosition::Latest),
        ]);
        let json = serde_json::to_string(&mark).unwrap();
        let restored: CheckpointMark = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, mark);
    }
}
