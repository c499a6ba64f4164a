//! In-memory scripted stream used by the cursor and reader tests.
//!
//! Each shard carries a script of events consumed one per fetch; failures
//! are injected as script entries, so tests can force transient, fatal and
//! expired-iterator conditions at exact points of the poll sequence.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::checkpoint::ShardPosition;
use crate::client::{IteratorHandle, RecordBatch, StreamClient};
use crate::error::{Error, Result};
use crate::message::{Record, SequenceNumber, ShardId};

/// What one fetch against a shard does.
#[derive(Debug, Clone)]
pub(crate) enum ShardEvent {
    /// Return these records.
    Records(Vec<Record>),
    /// Return an empty batch.
    Empty,
    /// Fail with a transient service error.
    TransientError,
    /// Fail with a fatal shard error.
    FatalError,
    /// Fail with an expired-iterator error.
    ExpiredError,
    /// Return an empty batch without a continuation: the shard is closed
    /// and fully consumed.
    End,
}

#[derive(Default)]
struct Inner {
    shard_order: Vec<ShardId>,
    scripts: HashMap<ShardId, VecDeque<ShardEvent>>,
    backlog_results: VecDeque<Result<i64>>,
    list_shards_error: Option<Error>,
    iterator_requests: HashMap<ShardId, usize>,
    read_batches: HashMap<ShardId, usize>,
    backlog_since: Vec<DateTime<Utc>>,
}

/// Scripted, in-memory [StreamClient].
#[derive(Clone)]
pub(crate) struct ScriptedStreamClient {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedStreamClient {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub(crate) fn add_shard(&self, shard_id: &str, events: Vec<ShardEvent>) {
        let mut inner = self.inner.lock().unwrap();
        let shard_id = ShardId::new(shard_id);
        inner.shard_order.push(shard_id.clone());
        inner.scripts.insert(shard_id, events.into());
    }

    pub(crate) fn script_backlog(&self, results: Vec<Result<i64>>) {
        self.inner.lock().unwrap().backlog_results = results.into();
    }

    pub(crate) fn fail_next_list_shards(&self, error: Error) {
        self.inner.lock().unwrap().list_shards_error = Some(error);
    }

    pub(crate) fn iterator_requests(&self, shard_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .iterator_requests
            .get(&ShardId::new(shard_id))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn read_batches(&self, shard_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .read_batches
            .get(&ShardId::new(shard_id))
            .copied()
            .unwrap_or(0)
    }

    /// The `since` timestamps of every backlog query, in call order.
    pub(crate) fn backlog_since(&self) -> Vec<DateTime<Utc>> {
        self.inner.lock().unwrap().backlog_since.clone()
    }
}

impl StreamClient for ScriptedStreamClient {
    async fn list_shards(&self, _stream: &str) -> Result<Vec<ShardId>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.list_shards_error.take() {
            return Err(error);
        }
        Ok(inner.shard_order.clone())
    }

    async fn shard_iterator(
        &self,
        _stream: &str,
        shard_id: &ShardId,
        _position: &ShardPosition,
    ) -> Result<IteratorHandle> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.iterator_requests.entry(shard_id.clone()).or_insert(0);
        *entry += 1;
        let count = *entry;
        Ok(IteratorHandle::new(format!("{shard_id}#{count}")))
    }

    async fn read_batch(
        &self,
        shard_id: &ShardId,
        iterator: &IteratorHandle,
    ) -> Result<RecordBatch> {
        let mut inner = self.inner.lock().unwrap();
        *inner.read_batches.entry(shard_id.clone()).or_insert(0) += 1;
        let event = inner
            .scripts
            .get_mut(shard_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ShardEvent::Empty);
        let continuation = Some(IteratorHandle::new(format!("{}+", iterator.as_str())));
        match event {
            ShardEvent::Records(records) => Ok(RecordBatch {
                records,
                next_iterator: continuation,
            }),
            ShardEvent::Empty => Ok(RecordBatch {
                records: vec![],
                next_iterator: continuation,
            }),
            ShardEvent::TransientError => {
                Err(Error::TransientService("injected transient failure".to_string()))
            }
            ShardEvent::FatalError => Err(Error::FatalShard("injected fatal failure".to_string())),
            ShardEvent::ExpiredError => {
                Err(Error::ExpiredIterator("injected expired iterator".to_string()))
            }
            ShardEvent::End => Ok(RecordBatch {
                records: vec![],
                next_iterator: None,
            }),
        }
    }

    async fn backlog_bytes(&self, _stream: &str, since: DateTime<Utc>) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.backlog_since.push(since);
        inner
            .backlog_results
            .pop_front()
            .unwrap_or(Ok(0))
    }
}

/// A test record with a deterministic payload and millisecond arrival time.
pub(crate) fn record(shard: &str, seq: &str, arrival_ms: i64) -> Record {
    Record {
        shard_id: ShardId::new(shard),
        partition_key: format!("pk-{seq}"),
        payload: Bytes::from(format!("payload-{seq}")),
        sequence_number: SequenceNumber::new(seq),
        arrival_time: DateTime::from_timestamp_millis(arrival_ms).unwrap(),
    }
}
