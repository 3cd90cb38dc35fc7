//! Error types for Kestrel
//!
//! This module defines the common error type used by the proxy and the
//! command line tools. The attribute codec has its own error type in
//! `kestrel-storage` because callers branch on its kind.

use crate::types::AccountNameError;
use thiserror::Error;

/// Common result type for Kestrel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Kestrel
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Request errors
    #[error("invalid account name: {0}")]
    InvalidAccountName(#[from] AccountNameError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    // Backend errors
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timeout")]
    Timeout,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Get the HTTP status code reported to clients
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidRequest(_) | Self::InvalidAccountName(_) => 400,

            // 401 Unauthorized
            Self::Unauthorized => 401,

            // 405 Method Not Allowed
            Self::MethodNotAllowed(_) => 405,

            // 500 Internal Server Error
            Self::Internal(_) | Self::Io(_) => 500,

            // 503 Service Unavailable
            Self::ServiceUnavailable(_)
            | Self::Timeout
            | Self::ConnectionFailed(_)
            | Self::Configuration(_) => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::Unauthorized.http_status_code(), 401);
        assert_eq!(Error::invalid_request("bad").http_status_code(), 400);
        assert_eq!(Error::internal("boom").http_status_code(), 500);
        assert_eq!(Error::Timeout.http_status_code(), 503);
        assert_eq!(Error::ConnectionFailed("refused".into()).http_status_code(), 503);
        assert_eq!(Error::MethodNotAllowed("PUT".into()).http_status_code(), 405);
        let too_long = Error::from(AccountNameError::TooLong { len: 300, max: 256 });
        assert_eq!(too_long.http_status_code(), 400);
    }
}
