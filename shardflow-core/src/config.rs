use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_WATERMARK_MIN_MESSAGES: usize = 10;
const DEFAULT_BACKLOG_REFRESH_SECS: u64 = 30;

/// Configuration for a [crate::reader::StreamReader].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReaderConfig {
    /// Name of the stream to read.
    pub stream: String,
    /// Number of recently read records whose arrival timestamps feed the
    /// watermark. The watermark does not start advancing until this many
    /// records have been read.
    #[serde(default = "default_watermark_min_messages")]
    pub watermark_min_messages: usize,
    /// Seconds a fetched backlog-bytes value stays fresh. Zero means every
    /// query attempts a fetch, falling back to the last good value on a
    /// transient failure.
    #[serde(default = "default_backlog_refresh_secs")]
    pub backlog_refresh_secs: u64,
}

impl ReaderConfig {
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            watermark_min_messages: DEFAULT_WATERMARK_MIN_MESSAGES,
            backlog_refresh_secs: DEFAULT_BACKLOG_REFRESH_SECS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.is_empty() {
            return Err(Error::Config("stream must not be empty".to_string()));
        }
        if self.watermark_min_messages == 0 {
            return Err(Error::Config(
                "watermark_min_messages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn backlog_refresh(&self) -> Duration {
        Duration::from_secs(self.backlog_refresh_secs)
    }
}

fn default_watermark_min_messages() -> usize {
    DEFAULT_WATERMARK_MIN_MESSAGES
}

fn default_backlog_refresh_secs() -> u64 {
    DEFAULT_BACKLOG_REFRESH_SECS
}
