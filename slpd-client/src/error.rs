//! Client error types.

use slpd_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("request timeout")]
    Timeout,

    #[error("server error: {code}")]
    ServerError { code: ErrorCode },
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::ErrorReply(code) => ClientError::ServerError { code },
            other => ClientError::Protocol(other),
        }
    }
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ServerError { code } => code.is_retryable(),
            ClientError::Protocol(_) => false,
        }
    }
}
