//! Canonical error and result types for the crate.
//!
//! Every failure is returned to the caller of the operation that observed it.
//! Nothing is retried or logged internally.

use std::io;

use thiserror::Error;

/// Error returned by [`StreamAdapter`](crate::StreamAdapter) operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The adapter was closed before or while the operation ran.
    #[error("stream adapter is closed")]
    Closed,
    /// The underlying framed connection reported a failure.
    #[error("transport error after {transferred} bytes: {source}")]
    Transport {
        /// Bytes moved into or out of the caller's buffer before the failure.
        transferred: usize,
        /// Error raised by the framed connection.
        #[source]
        source: io::Error,
    },
}

impl StreamError {
    pub(crate) fn transport(transferred: usize, source: io::Error) -> Self {
        Self::Transport {
            transferred,
            source,
        }
    }

    /// Returns `true` if the adapter had been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool { matches!(self, Self::Closed) }

    /// Number of bytes transferred by the failed call before it failed.
    #[must_use]
    pub fn transferred(&self) -> usize {
        match self {
            Self::Closed => 0,
            Self::Transport { transferred, .. } => *transferred,
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(error: StreamError) -> Self {
        match error {
            StreamError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, StreamError::Closed),
            StreamError::Transport { source, .. } => source,
        }
    }
}

/// Result alias used by the adapter's public API.
pub type Result<T> = std::result::Result<T, StreamError>;
