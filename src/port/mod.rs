//! Port abstraction layer for serial communication.
//!
//! Provides the lockable port handle, the opener trait, and implementations
//! for real hardware and for tests.

pub mod error;
pub mod handle;
pub mod mock;
pub mod traits;

#[cfg(feature = "async-serial")]
pub mod async_port;

pub use error::PortError;
pub use handle::{Direction, PortHandle, StreamGuard, StreamSlot};
pub use mock::MockSerialPort;
pub use traits::*;

#[cfg(feature = "async-serial")]
pub use async_port::TokioSerialOpener;
