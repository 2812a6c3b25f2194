//! Port handle with exclusively lockable inbound and outbound streams.
//!
//! A [`PortHandle`] carries one inbound byte stream and one outbound byte
//! stream. Each stream lives in a [`StreamSlot`] that can be held by at most
//! one [`StreamGuard`] at a time; dropping the guard puts the stream back so
//! the next holder can lock it again.

use super::error::PortError;
use super::traits::{BoxedReader, BoxedWriter, PortConfiguration, PortOpener};
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::info;

/// Which half of the link a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to host.
    Inbound,
    /// Host to device.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

enum SlotState<T> {
    /// The port has not been opened (or was closed).
    Closed,
    Available(T),
    Locked,
    /// The stream faulted fatally and is gone until the port is reopened.
    Retired,
}

impl<T> SlotState<T> {
    fn label(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Available(_) => "available",
            Self::Locked => "locked",
            Self::Retired => "retired",
        }
    }
}

/// A single stream of a port, lockable by one holder at a time.
pub struct StreamSlot<T> {
    direction: Direction,
    state: Mutex<SlotState<T>>,
}

impl<T> StreamSlot<T> {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            state: Mutex::new(SlotState::Closed),
        }
    }

    /// The direction this slot serves.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether the stream exists (available or currently locked).
    pub fn is_present(&self) -> bool {
        matches!(
            *self.state.lock(),
            SlotState::Available(_) | SlotState::Locked
        )
    }

    /// Whether a guard currently holds the stream.
    pub fn is_locked(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Locked)
    }

    fn install(&self, stream: T) {
        *self.state.lock() = SlotState::Available(stream);
    }

    fn reset(&self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Locked) {
            return Err(PortError::Locked(self.direction));
        }
        *state = SlotState::Closed;
        Ok(())
    }

    /// Take exclusive ownership of the stream.
    ///
    /// Fails with [`PortError::Locked`] if another guard holds it and with
    /// [`PortError::NotOpen`] if there is no stream at all.
    pub fn lock(self: &Arc<Self>) -> Result<StreamGuard<T>, PortError> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SlotState::Locked) {
            SlotState::Available(stream) => Ok(StreamGuard {
                slot: Arc::clone(self),
                stream: Some(stream),
                retired: false,
            }),
            SlotState::Locked => Err(PortError::Locked(self.direction)),
            other => {
                *state = other;
                Err(PortError::NotOpen)
            }
        }
    }
}

impl<T> fmt::Debug for StreamSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSlot")
            .field("direction", &self.direction)
            .field("state", &self.state.lock().label())
            .finish()
    }
}

/// Exclusive hold on a port stream; returns it to its slot on drop.
pub struct StreamGuard<T> {
    slot: Arc<StreamSlot<T>>,
    stream: Option<T>,
    retired: bool,
}

impl<T> StreamGuard<T> {
    /// Mark the stream as lost. It is dropped instead of being returned to
    /// the slot, so the port stops reporting it as present.
    pub fn retire(&mut self) {
        self.retired = true;
    }

    /// The direction of the held stream.
    pub fn direction(&self) -> Direction {
        self.slot.direction
    }
}

impl<T> Deref for StreamGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the stream out.
        self.stream.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for StreamGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.stream.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for StreamGuard<T> {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let mut state = self.slot.state.lock();
            *state = if self.retired {
                SlotState::Retired
            } else {
                SlotState::Available(stream)
            };
        }
    }
}

impl<T> fmt::Debug for StreamGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamGuard")
            .field("direction", &self.slot.direction)
            .field("retired", &self.retired)
            .finish()
    }
}

/// A bidirectional byte link to one device.
///
/// The handle does not own the physical device, only the session's access to
/// it: [`open`](Self::open) asks the opener for a fresh pair of streams and
/// [`close`](Self::close) drops them again.
pub struct PortHandle {
    name: String,
    opener: Box<dyn PortOpener>,
    inbound: Arc<StreamSlot<BoxedReader>>,
    outbound: Arc<StreamSlot<BoxedWriter>>,
}

impl PortHandle {
    /// Create a closed handle that opens through `opener`.
    pub fn new(name: impl Into<String>, opener: impl PortOpener + 'static) -> Self {
        Self {
            name: name.into(),
            opener: Box::new(opener),
            inbound: Arc::new(StreamSlot::new(Direction::Inbound)),
            outbound: Arc::new(StreamSlot::new(Direction::Outbound)),
        }
    }

    /// The name/path of the port.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the inbound stream exists.
    pub fn is_readable(&self) -> bool {
        self.inbound.is_present()
    }

    /// Whether the outbound stream exists.
    pub fn is_writable(&self) -> bool {
        self.outbound.is_present()
    }

    /// Whether either direction is present.
    pub fn is_open(&self) -> bool {
        self.is_readable() || self.is_writable()
    }

    /// Open the port, installing fresh inbound and outbound streams.
    pub async fn open(&mut self, config: &PortConfiguration) -> Result<(), PortError> {
        if self.is_open() {
            return Err(PortError::AlreadyOpen);
        }
        let (reader, writer) = self.opener.open(&self.name, config).await?;
        self.inbound.install(reader);
        self.outbound.install(writer);
        info!(port = %self.name, baud = config.baud_rate, "port opened");
        Ok(())
    }

    /// Drop both streams. Fails if either one is still locked.
    pub fn close(&self) -> Result<(), PortError> {
        if self.inbound.is_locked() {
            return Err(PortError::Locked(Direction::Inbound));
        }
        if self.outbound.is_locked() {
            return Err(PortError::Locked(Direction::Outbound));
        }
        self.inbound.reset()?;
        self.outbound.reset()?;
        info!(port = %self.name, "port closed");
        Ok(())
    }

    /// Lock the inbound stream.
    pub fn lock_inbound(&self) -> Result<StreamGuard<BoxedReader>, PortError> {
        self.inbound.lock()
    }

    /// Lock the outbound stream.
    pub fn lock_outbound(&self) -> Result<StreamGuard<BoxedWriter>, PortError> {
        self.outbound.lock()
    }

    /// The inbound slot.
    pub fn inbound(&self) -> &StreamSlot<BoxedReader> {
        &self.inbound
    }

    /// The outbound slot.
    pub fn outbound(&self) -> &StreamSlot<BoxedWriter> {
        &self.outbound
    }
}

impl fmt::Debug for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortHandle")
            .field("name", &self.name)
            .field("opener", &self.opener)
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .finish()
    }
}
