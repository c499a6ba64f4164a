use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Setup Error - {0}")]
    Setup(String),

    #[error("Transient Service Error - {0}")]
    TransientService(String),

    #[error("Expired Iterator - {0}")]
    ExpiredIterator(String),

    #[error("Fatal Shard Error - {0}")]
    FatalShard(String),

    #[error("no current record, the last poll returned no data")]
    NoCurrentRecord,

    #[error("Config Error - {0}")]
    Config(String),

    #[error("OneShot Receiver Error - {0}")]
    ActorPatternRecv(String),
}

impl Error {
    /// Whether retrying shortly after is expected to succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientService(_))
    }
}
