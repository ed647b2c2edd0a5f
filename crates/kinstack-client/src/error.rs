//! Device client error types.
//!
//! [`DeviceError`] separates the three ways a device call can fail:
//! rejected before any I/O ([`DeviceError::InvalidArgument`]), failed on the
//! stream ([`DeviceError::Transport`], [`DeviceError::Protocol`],
//! [`DeviceError::Timeout`], [`DeviceError::ConnectionClosed`]) or answered
//! with a non-success status ([`DeviceError::Status`]). Only the stream
//! failures leave a client unusable.

use kinstack_proto::{ProtoError, StatusCode};

/// Errors returned by device clients and the connection pool.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    // -----------------------------------------------------------------------
    // Caller errors (nothing was sent)
    // -----------------------------------------------------------------------
    /// The request was malformed and was rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not available on this kind of device.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    // -----------------------------------------------------------------------
    // Stream errors (the connection is no longer usable)
    // -----------------------------------------------------------------------
    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtoError),

    /// Reading from or writing to the stream failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The device answered with something that does not correlate with the
    /// outstanding request.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The device did not answer in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The connection was closed, by either side.
    #[error("connection closed")]
    ConnectionClosed,

    // -----------------------------------------------------------------------
    // Device status errors (the connection stays usable)
    // -----------------------------------------------------------------------
    /// The device reported a non-success status.
    #[error("device status {code}: {message}")]
    Status {
        /// Status code from the response.
        code: StatusCode,
        /// Status message from the response, possibly empty.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Pool errors
    // -----------------------------------------------------------------------
    /// The pool was closed.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Catch-all for unexpected failures.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DeviceError {
    /// Build a status error.
    #[must_use]
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// The device status code, for status errors.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the device reported the key as absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(StatusCode::NotFound)
    }

    /// Whether the error leaves the connection unusable.
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Codec(_)
                | Self::Transport(_)
                | Self::Protocol(_)
                | Self::Timeout(_)
                | Self::ConnectionClosed
        )
    }
}

/// Convenience alias for device results.
pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_classify_status_errors_as_recoverable() {
        let err = DeviceError::status(StatusCode::NotFound, "no such key");
        assert!(err.is_not_found());
        assert!(!err.is_connection_fatal());
        assert_eq!(err.to_string(), "device status NOT_FOUND: no such key");
    }

    #[test]
    fn test_should_classify_stream_errors_as_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(DeviceError::from(io).is_connection_fatal());
        assert!(DeviceError::ConnectionClosed.is_connection_fatal());
        assert!(DeviceError::from(ProtoError::BadMagic(0)).is_connection_fatal());
        assert!(!DeviceError::InvalidArgument("key".into()).is_connection_fatal());
        assert_eq!(DeviceError::PoolClosed.status_code(), None);
    }
}
