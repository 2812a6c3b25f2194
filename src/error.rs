//! Connection-level error handling.
//!
//! `ConnectionError` is `Clone` because pipeline outcomes are stored in
//! closed markers that any number of callers may await.

use crate::port::{Direction, PortError};
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a chunk consumer.
pub type ConsumerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by a connection, its pipelines, and its read loop.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// The session's abort signal was triggered with this reason.
    #[error("connection aborted: {0}")]
    Aborted(String),

    /// The outbound writer was closed or its pipeline has ended.
    #[error("the outbound writer is closed")]
    WriterClosed,

    /// A stream of the port failed.
    #[error("I/O error on the {direction} stream: {source}")]
    Io {
        direction: Direction,
        #[source]
        source: Arc<io::Error>,
    },

    /// The port handle refused an operation.
    #[error("port error: {0}")]
    Port(#[source] Arc<PortError>),

    /// The chunk consumer returned an error.
    #[error("chunk consumer failed: {0}")]
    Consumer(Arc<dyn std::error::Error + Send + Sync>),

    /// The read loop was already started on this connection.
    #[error("the read loop is already running")]
    AlreadyStarted,

    /// The read loop rebuilt its pipeline too many times without delivering data.
    #[error("read loop stopped after {0} consecutive restarts without data")]
    RestartLimit(u32),

    /// A pipeline task ended without reporting how it finished.
    #[error("pipeline task ended unexpectedly")]
    Interrupted,
}

impl ConnectionError {
    /// Wrap an I/O error raised on one direction of the port.
    pub fn io(direction: Direction, error: io::Error) -> Self {
        Self::Io {
            direction,
            source: Arc::new(error),
        }
    }

    /// Wrap an error returned by a chunk consumer.
    pub fn consumer(error: ConsumerError) -> Self {
        Self::Consumer(Arc::from(error))
    }

    /// Whether this is an abort triggered through the session's signal.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Whether the error means the underlying stream is gone for good
    /// (device unplugged, link torn down), as opposed to a transient fault.
    pub fn is_link_lost(&self) -> bool {
        match self {
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

impl From<PortError> for ConnectionError {
    fn from(err: PortError) -> Self {
        Self::Port(Arc::new(err))
    }
}

/// Which part of the read side reported an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSource {
    /// The pipe from the port's inbound stream into the decode transform.
    ReadableStream,
    /// A read on the transform's output inside the pump.
    ReadingLoop,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadableStream => f.write_str("readableStream"),
            Self::ReadingLoop => f.write_str("readingLoop"),
        }
    }
}
