//! Single-shard consumer: owns one shard's resume position and pulls
//! records out one at a time.

use std::collections::VecDeque;

use tracing::debug;

use crate::checkpoint::ShardCheckpoint;
use crate::client::{IteratorHandle, StreamClient};
use crate::error::{Error, Result};
use crate::message::Record;

#[derive(Debug, Clone, PartialEq)]
enum CursorState {
    /// No remote iterator yet; one is created from the checkpoint on first
    /// use.
    Uninitialized,
    Active(IteratorHandle),
    /// The shard is closed upstream and fully consumed; no further remote
    /// calls are made.
    Ended,
    Closed,
}

/// Consumes one shard. The remote service hands records out in batches
/// behind a continuation iterator; the cursor buffers a batch and pops a
/// single record per [ShardCursor::next] call, advancing its checkpoint
/// past every record it hands out.
pub(crate) struct ShardCursor<C> {
    client: C,
    stream: String,
    checkpoint: ShardCheckpoint,
    state: CursorState,
    buffer: VecDeque<Record>,
}

impl<C: StreamClient> ShardCursor<C> {
    pub(crate) fn new(client: C, stream: String, checkpoint: ShardCheckpoint) -> Self {
        Self {
            client,
            stream,
            checkpoint,
            state: CursorState::Uninitialized,
            buffer: VecDeque::new(),
        }
    }

    pub(crate) fn checkpoint(&self) -> &ShardCheckpoint {
        &self.checkpoint
    }

    /// Pull the next record, or report that the shard has nothing right
    /// now. `Ok(None)` is never end-of-data for an open shard; the caller
    /// polls again later.
    pub(crate) async fn next(&mut self) -> Result<Option<Record>> {
        if self.buffer.is_empty() {
            self.fill_buffer().await?;
        }
        let Some(record) = self.buffer.pop_front() else {
            return Ok(None);
        };
        self.checkpoint = self.checkpoint.moved_past(&record.sequence_number);
        Ok(Some(record))
    }

    /// Release the shard. Pending buffered records are dropped; they were
    /// never handed out, so the checkpoint does not cover them.
    pub(crate) fn close(&mut self) {
        self.buffer.clear();
        self.state = CursorState::Closed;
    }

    async fn fill_buffer(&mut self) -> Result<()> {
        if matches!(self.state, CursorState::Ended | CursorState::Closed) {
            return Ok(());
        }
        let iterator = if let CursorState::Active(handle) = &self.state {
            handle.clone()
        } else {
            self.create_iterator().await?
        };

        let batch = match self
            .client
            .read_batch(&self.checkpoint.shard_id, &iterator)
            .await
        {
            Ok(batch) => batch,
            Err(Error::ExpiredIterator(msg)) => {
                // The service expires handles that sit idle. Re-create from
                // the checkpoint and retry the fetch once.
                debug!(
                    shard_id = %self.checkpoint.shard_id,
                    msg, "Shard iterator expired, refreshing"
                );
                let refreshed = self.create_iterator().await?;
                self.client
                    .read_batch(&self.checkpoint.shard_id, &refreshed)
                    .await
                    .map_err(|e| match e {
                        Error::ExpiredIterator(msg) => Error::TransientService(format!(
                            "shard iterator expired immediately after refresh: {msg}"
                        )),
                        other => other,
                    })?
            }
            Err(e) => return Err(e),
        };

        match batch.next_iterator {
            Some(handle) => self.state = CursorState::Active(handle),
            None => {
                debug!(shard_id = %self.checkpoint.shard_id, "Shard is closed and fully consumed");
                self.state = CursorState::Ended;
            }
        }

        let fetched = batch.records.len();
        let checkpoint = self.checkpoint.clone();
        self.buffer.extend(
            batch
                .records
                .into_iter()
                .filter(|record| !checkpoint.is_consumed(&record.sequence_number)),
        );
        if self.buffer.len() < fetched {
            debug!(
                shard_id = %self.checkpoint.shard_id,
                dropped = fetched - self.buffer.len(),
                "Dropped re-delivered records at or below the checkpoint"
            );
        }
        Ok(())
    }

    async fn create_iterator(&mut self) -> Result<IteratorHandle> {
        let handle = self
            .client
            .shard_iterator(&self.stream, &self.checkpoint.shard_id, &self.checkpoint.position)
            .await?;
        self.state = CursorState::Active(handle.clone());
        Ok(handle)
    }
}
