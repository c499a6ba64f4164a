//! Library for reading sharded AWS Kinesis streams using an actor-based
//! architecture.
//!
//! This crate provides a fault-tolerant interface for Kinesis with a
//! focus on:
//! - Error propagation and handling for AWS SDK errors
//! - Actor-based concurrency model for thread safety
//! - Bounded timeouts on every remote call

use tokio::sync::oneshot;

pub mod client;
pub mod source;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed with Kinesis error - {0}")]
    Kinesis(#[from] aws_sdk_kinesis::Error),

    #[error("Failed with CloudWatch error - {0}")]
    CloudWatch(#[from] aws_sdk_cloudwatch::Error),

    #[error("Request did not complete within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Failed to receive message from channel. Actor task is terminated: {0:?}")]
    ActorTaskTerminated(oneshot::error::RecvError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}
