//! Error types for the icc store.

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store cannot be reached or the connection broke mid-command.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store answered with something that does not fit the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller cancelled a blocking receive.
    #[error("receive cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error means the store could not be talked to.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Whether the error is a caller-requested cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error()
            || e.is_connection_refusal()
            || e.is_connection_dropped()
            || e.is_timeout()
        {
            Self::Connection(e.to_string())
        } else {
            Self::Protocol(e.to_string())
        }
    }
}

impl From<bb8::RunError<redis::RedisError>> for Error {
    fn from(e: bb8::RunError<redis::RedisError>) -> Self {
        match e {
            bb8::RunError::User(e) => e.into(),
            bb8::RunError::TimedOut => {
                Self::Connection("timed out waiting for a pooled connection".to_string())
            }
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
