//! Record and position types shared across the crate.

use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one shard of the stream.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        ShardId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ShardId {
    fn from(id: &str) -> Self {
        ShardId(id.to_string())
    }
}

/// Position of a single record within one shard.
///
/// The service issues unbounded decimal sequence numbers, so ordering is
/// numeric: shorter strings sort first, equal lengths compare
/// lexicographically.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceNumber(String);

impl SequenceNumber {
    pub fn new(seq: impl Into<String>) -> Self {
        SequenceNumber(seq.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialOrd for SequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SequenceNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single record read from one shard.
/// NOTE: It is cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Shard the record was read from.
    pub shard_id: ShardId,
    /// Partition key the producer wrote the record with.
    pub partition_key: String,
    /// Opaque payload.
    pub payload: Bytes,
    /// Position of this record within its shard.
    pub sequence_number: SequenceNumber,
    /// Approximate time the record arrived at the stream. An event-time
    /// hint, not authoritative: delivery jitter can reorder it.
    pub arrival_time: DateTime<Utc>,
}
