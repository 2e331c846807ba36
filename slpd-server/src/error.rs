//! Server error types.

use crate::config::ConfigError;
use slpd_protocol::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] slpd_protocol::ProtocolError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("failed to read services file '{}': {source}", path.display())]
    ServicesFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics error: {0}")]
    Metrics(String),
}

impl ServerError {
    /// Converts to the SLP error code reported to a peer.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::Protocol(e) => e.error_code(),
            _ => ErrorCode::InternalError,
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }
}

impl From<prometheus::Error> for ServerError {
    fn from(e: prometheus::Error) -> Self {
        ServerError::Metrics(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slpd_protocol::ProtocolError;

    #[test]
    fn test_error_code_mapping() {
        let err = ServerError::from(ProtocolError::UnsupportedVersion(1));
        assert_eq!(err.error_code(), ErrorCode::VerNotSupported);

        let err = ServerError::from(std::io::Error::other("boom"));
        assert_eq!(err.error_code(), ErrorCode::InternalError);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_services_file_display() {
        let err = ServerError::ServicesFile {
            path: PathBuf::from("/etc/slp_lite.conf"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/etc/slp_lite.conf"));
    }
}
