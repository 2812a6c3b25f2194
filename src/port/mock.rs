//! Mock serial port implementation for testing.
//!
//! Provides a `MockSerialPort` that simulates a device without requiring
//! actual hardware. The test plays the device: it feeds inbound blocks,
//! injects end-of-stream and read faults, stalls the outbound side, and
//! inspects what the host wrote.

use super::error::PortError;
use super::handle::PortHandle;
use super::traits::{BoxedReader, BoxedWriter, PortConfiguration, PortOpener};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Something the device side has queued for the host to read.
#[derive(Debug)]
enum Inbound {
    Block(Vec<u8>),
    EndOfStream,
    Fault(io::ErrorKind),
}

/// Inner state of the mock port, shared between the device side and the
/// streams handed to the port handle.
#[derive(Debug, Default)]
struct MockPortState {
    /// Queue of blocks and events returned by inbound reads.
    inbound: VecDeque<Inbound>,
    read_waker: Option<Waker>,
    /// Log of all blocks written to the port.
    write_log: Vec<Vec<u8>>,
    /// While set, outbound writes stay pending.
    write_stalled: bool,
    write_waker: Option<Waker>,
    /// Number of logged writes at the moment the outbound stream was shut down.
    shutdown_after: Option<usize>,
    open_count: usize,
}

/// Mock serial port implementation for testing.
///
/// # Example
/// ```
/// use serial_link::port::{MockSerialPort, PortConfiguration};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let device = MockSerialPort::new("MOCK0");
/// let mut port = device.handle();
/// port.open(&PortConfiguration::default()).await?;
///
/// // Bytes the host will read, one block per read
/// device.feed(b"OK");
/// device.feed(b"\r\n");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    /// The port name/identifier.
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock device with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState::default())),
        }
    }

    /// A closed port handle that opens onto this device.
    pub fn handle(&self) -> PortHandle {
        PortHandle::new(self.name.clone(), self.clone())
    }

    /// Queue one inbound block. Each block is delivered by its own read.
    pub fn feed(&self, data: &[u8]) {
        self.push(Inbound::Block(data.to_vec()));
    }

    /// Make the next read after the queued blocks report end-of-stream.
    pub fn end_of_stream(&self) {
        self.push(Inbound::EndOfStream);
    }

    /// Make the next read after the queued blocks fail with `kind`.
    pub fn fail_read(&self, kind: io::ErrorKind) {
        self.push(Inbound::Fault(kind));
    }

    fn push(&self, item: Inbound) {
        let mut state = self.state.lock();
        state.inbound.push_back(item);
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
    }

    /// Hold outbound writes pending until released with `false`.
    pub fn set_write_stalled(&self, stalled: bool) {
        let mut state = self.state.lock();
        state.write_stalled = stalled;
        if !stalled {
            if let Some(waker) = state.write_waker.take() {
                waker.wake();
            }
        }
    }

    /// Get a copy of every block written to the port.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All written bytes, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// Whether the host shut the outbound stream down.
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown_after.is_some()
    }

    /// How many writes had been logged when the outbound stream was shut down.
    pub fn shutdown_after_writes(&self) -> Option<usize> {
        self.state.lock().shutdown_after
    }

    /// How many times the port has been opened.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Number of inbound items not yet consumed by the host.
    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }
}

#[async_trait]
impl PortOpener for MockSerialPort {
    async fn open(
        &mut self,
        _port_name: &str,
        _config: &PortConfiguration,
    ) -> Result<(BoxedReader, BoxedWriter), PortError> {
        self.state.lock().open_count += 1;
        let reader = MockReader {
            state: Arc::clone(&self.state),
        };
        let writer = MockWriter {
            state: Arc::clone(&self.state),
        };
        Ok((Box::new(reader), Box::new(writer)))
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("pending_inbound", &self.pending_inbound())
            .finish()
    }
}

struct MockReader {
    state: Arc<Mutex<MockPortState>>,
}

impl AsyncRead for MockReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.state.lock();
        let Some(front) = state.inbound.front_mut() else {
            state.read_waker = Some(cx.waker().clone());
            return Poll::Pending;
        };

        match front {
            Inbound::Block(block) => {
                let n = block.len().min(buf.remaining());
                buf.put_slice(&block[..n]);
                block.drain(..n);
                if block.is_empty() {
                    state.inbound.pop_front();
                }
                Poll::Ready(Ok(()))
            }
            Inbound::EndOfStream => {
                state.inbound.pop_front();
                Poll::Ready(Ok(()))
            }
            Inbound::Fault(kind) => {
                let kind = *kind;
                state.inbound.pop_front();
                Poll::Ready(Err(io::Error::new(kind, "mock read failure")))
            }
        }
    }
}

struct MockWriter {
    state: Arc<Mutex<MockPortState>>,
}

impl AsyncWrite for MockWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock();
        if state.write_stalled {
            state.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        state.write_log.push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.state.lock();
        let written = state.write_log.len();
        state.shutdown_after.get_or_insert(written);
        Poll::Ready(Ok(()))
    }
}
