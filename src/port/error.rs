//! Port-specific error types.
//!
//! Defines error types for port handle operations, separate from
//! connection-level errors to maintain clean separation of concerns.

use super::handle::Direction;
use thiserror::Error;

/// Errors that can occur while opening, locking, or closing a port.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Attempted to open a port whose streams are already present.
    #[error("The target port is already open")]
    AlreadyOpen,

    /// Attempted to use a stream of a port that's not open.
    #[error("Port is not open")]
    NotOpen,

    /// Another holder already has the stream locked.
    #[error("The {0} stream is locked")]
    Locked(Direction),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
