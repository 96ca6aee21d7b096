//! Client error types for the lockd SDK

use lockd_api::{CodecError, Packet};

/// Error type for lock client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("lock '{0}' was not granted: server closed the connection")]
    NotGranted(String),

    #[error("lock '{0}' was not granted within the timeout")]
    Timeout(String),

    #[error("unexpected response: {0:?}")]
    UnexpectedResponse(Packet),

    #[error("connection is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
