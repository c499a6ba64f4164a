//! Pull-based reader over sharded, append-only event streams.
//!
//! A stream is a set of shards; each shard preserves strict record order,
//! shards are independent of one another. [StreamReader] merges every
//! shard into one logical cursor behind a non-blocking poll contract
//! (`start()` once, then `advance()` until it reports no data), estimates
//! event-time progress from noisy per-record arrival timestamps, and
//! serves a staleness-tolerant backlog-bytes signal for monitoring and
//! auto-scaling. Progress is captured in immutable [CheckpointMark]
//! snapshots the host persists to resume after a restart.

pub mod checkpoint;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod reader;

mod backlog;
mod cursor;
mod watermark;

#[cfg(test)]
mod test_utils;

pub use crate::checkpoint::{
    CheckpointGenerator, CheckpointMark, ShardCheckpoint, ShardListingGenerator, ShardPosition,
    StaticMarkGenerator,
};
pub use crate::client::{IteratorHandle, RecordBatch, StreamClient};
pub use crate::config::ReaderConfig;
pub use crate::error::{Error, Result};
pub use crate::message::{Record, SequenceNumber, ShardId};
pub use crate::reader::StreamReader;
