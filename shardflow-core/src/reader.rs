//! The multi-shard reader: one logical cursor over every shard of a
//! stream, polled by the host one record at a time.

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::backlog::BacklogCache;
use crate::checkpoint::{CheckpointGenerator, CheckpointMark};
use crate::client::StreamClient;
use crate::config::ReaderConfig;
use crate::cursor::ShardCursor;
use crate::error::{Error, Result};
use crate::message::Record;
use crate::watermark::WatermarkEstimator;

/// Pull-based reader over all shards of one stream.
///
/// Drive it with [StreamReader::start] once, then [StreamReader::advance]
/// repeatedly; both report whether a record became available. `false`
/// means "nothing right now", never end-of-stream — the stream is
/// unbounded and the host owns the poll cadence and backoff. Shards are
/// polled round robin so no busy shard can starve the others, at the cost
/// of only approximate time ordering across shards; a true event-time
/// merge would need blocking reads against every shard.
///
/// The reader is built for a single logical caller: `&mut self` on every
/// mutating operation enforces that contract, and no internal locking is
/// performed.
pub struct StreamReader<C, G> {
    client: C,
    generator: G,
    config: ReaderConfig,
    cursors: Vec<ShardCursor<C>>,
    rotation: usize,
    current: Option<Record>,
    watermark: WatermarkEstimator,
    backlog: BacklogCache,
}

impl<C, G> StreamReader<C, G>
where
    C: StreamClient,
    G: CheckpointGenerator<C>,
{
    pub fn new(client: C, generator: G, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            watermark: WatermarkEstimator::new(config.watermark_min_messages),
            backlog: BacklogCache::new(config.backlog_refresh()),
            client,
            generator,
            cursors: Vec::new(),
            rotation: 0,
            current: None,
            config,
        })
    }

    /// Obtain the initial checkpoint, build one cursor per shard and poll
    /// once. Returns whether a record became available.
    pub async fn start(&mut self) -> Result<bool> {
        let mark = self.generator.generate(&self.client).await?;
        self.cursors = mark
            .iter()
            .map(|checkpoint| {
                ShardCursor::new(
                    self.client.clone(),
                    self.config.stream.clone(),
                    checkpoint.clone(),
                )
            })
            .collect();
        self.rotation = 0;
        info!(
            stream = %self.config.stream,
            shards = self.cursors.len(),
            "Starting multi-shard reader"
        );
        self.advance().await
    }

    /// One fair rotation pass across the shard set.
    ///
    /// Starting at the rotation pointer, each shard is asked for its next
    /// record, the pointer moving one past every shard checked. The first
    /// record wins and the pointer stays one past the winning shard, so
    /// the next poll picks up the rotation from there. A full empty pass
    /// returns `Ok(false)` with the pointer back where it started, and the
    /// next poll retries the shards in the same order.
    ///
    /// A transient failure from a shard counts as "no record from this
    /// shard" and ends the pass with `Ok(false)`; the host retries later.
    /// Fatal shard errors propagate.
    pub async fn advance(&mut self) -> Result<bool> {
        self.current = None;
        for _ in 0..self.cursors.len() {
            let idx = self.rotation;
            self.rotation = (self.rotation + 1) % self.cursors.len();
            let Some(cursor) = self.cursors.get_mut(idx) else {
                break;
            };
            match cursor.next().await {
                Ok(Some(record)) => {
                    self.watermark.observe(record.arrival_time);
                    self.current = Some(record);
                    return Ok(true);
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    warn!(
                        shard_id = %cursor.checkpoint().shard_id,
                        error = %e,
                        "Transient failure while polling shard, no progress this poll"
                    );
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// The record produced by the most recent successful poll.
    pub fn current(&self) -> Result<Record> {
        self.current.clone().ok_or(Error::NoCurrentRecord)
    }

    /// Event-time progress estimate; non-decreasing across calls.
    pub fn watermark(&mut self) -> DateTime<Utc> {
        self.watermark.current()
    }

    /// Approximate unread bytes upstream, the lag signal consumed by
    /// monitoring and auto-scaling. Served from a short-lived cache; a
    /// transiently failing fetch is masked by the last good value.
    pub async fn backlog_bytes(&mut self) -> Result<i64> {
        let since = self.watermark.current();
        let client = &self.client;
        let stream = self.config.stream.as_str();
        self.backlog
            .get(Instant::now(), || client.backlog_bytes(stream, since))
            .await
    }

    /// Fresh snapshot of every shard's resume position. Never touches the
    /// remote service; safe to call between any two polls.
    pub fn checkpoint_mark(&self) -> CheckpointMark {
        CheckpointMark::new(
            self.cursors
                .iter()
                .map(|cursor| cursor.checkpoint().clone())
                .collect(),
        )
    }

    /// Release per-shard resources. The reader reports no data and no
    /// current record from here on.
    pub fn close(&mut self) {
        for cursor in &mut self.cursors {
            cursor.close();
        }
        self.cursors.clear();
        self.current = None;
        info!(stream = %self.config.stream, "Closed multi-shard reader");
    }
}
