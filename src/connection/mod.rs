//! Duplex connection over one serial port.
//!
//! A [`Connection`] owns the port handle, the abort signal shared by both
//! directions, the single outbound writer, and the read loop that keeps
//! rebuilding the inbound pipeline.
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_link::connection::{connect_serial_port, open_serial_port, ConnectOptions};
//! use serial_link::port::{MockSerialPort, PortConfiguration};
//! use serial_link::transform::DecodedChunk;
//! use serial_link::ConsumerError;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let device = MockSerialPort::new("MOCK0");
//! let mut port = device.handle();
//! open_serial_port(&mut port, &PortConfiguration::default(), None).await?;
//!
//! let consumer = |chunk: DecodedChunk| async move {
//!     print!("{}", chunk.text());
//!     Ok::<_, ConsumerError>(())
//! };
//! let connection = connect_serial_port(port, consumer, ConnectOptions::default()).await?;
//! connection.write("AT\r\n").await?;
//! connection.cancel().await;
//! # Ok(())
//! # }
//! ```

mod marker;
mod reader;
mod signal;
mod writer;

pub use marker::{ClosedMarker, PipeOutcome};
pub use reader::{ChunkReader, ReaderHandle};
pub use signal::AbortSignal;
pub use writer::OutboundWriter;

pub(crate) use reader::{pipe_inbound, InboundPipe};

use crate::config::{ReadLoopConfig, WriteConfig};
use crate::error::{ConnectionError, ConsumerError, ErrorSource};
use crate::port::{PortConfiguration, PortError, PortHandle};
use crate::read_loop::{self, ReadCallbacks};
use crate::transform::DecodedChunk;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Called with every pipe fault or read error of the read side.
pub type ErrorCallback = Arc<dyn Fn(&ConnectionError, ErrorSource) + Send + Sync>;

/// Called once per read-loop iteration with the new reader's handle.
pub type ReaderCreatedCallback = Box<dyn FnMut(ReaderHandle) -> BoxFuture<'static, ()> + Send>;

/// Called once when the session starts, with the writer if the port has an
/// outbound stream.
pub type WriterCreatedCallback =
    Box<dyn FnOnce(Option<OutboundWriter>) -> BoxFuture<'static, ()> + Send>;

/// Called by [`open_serial_port`] after the port opened.
pub type PortOpenCallback = Box<dyn FnOnce(&PortHandle) + Send>;

/// Receives decoded chunks, one at a time, in arrival order.
///
/// The read loop awaits each call before reading the next chunk. Returning an
/// error ends the read loop.
#[async_trait]
pub trait ChunkConsumer: Send {
    async fn on_chunk(&mut self, chunk: DecodedChunk) -> Result<(), ConsumerError>;
}

#[async_trait]
impl<F, Fut> ChunkConsumer for F
where
    F: FnMut(DecodedChunk) -> Fut + Send,
    Fut: Future<Output = Result<(), ConsumerError>> + Send + 'static,
{
    async fn on_chunk(&mut self, chunk: DecodedChunk) -> Result<(), ConsumerError> {
        (self)(chunk).await
    }
}

/// Optional callbacks and tuning for [`connect_serial_port`].
#[derive(Default)]
pub struct ConnectOptions {
    pub on_error: Option<ErrorCallback>,
    pub on_reader_created: Option<ReaderCreatedCallback>,
    pub on_writer_created: Option<WriterCreatedCallback>,
    pub read_loop: ReadLoopConfig,
    pub write: WriteConfig,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ConnectionError, ErrorSource) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_reader_created<F, Fut>(mut self, mut callback: F) -> Self
    where
        F: FnMut(ReaderHandle) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_reader_created = Some(Box::new(move |handle| Box::pin(callback(handle))));
        self
    }

    pub fn on_writer_created<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce(Option<OutboundWriter>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_writer_created = Some(Box::new(move |writer| Box::pin(callback(writer))));
        self
    }

    pub fn read_loop(mut self, settings: ReadLoopConfig) -> Self {
        self.read_loop = settings;
        self
    }

    pub fn write(mut self, settings: WriteConfig) -> Self {
        self.write = settings;
        self
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("on_error", &self.on_error.is_some())
            .field("on_reader_created", &self.on_reader_created.is_some())
            .field("on_writer_created", &self.on_writer_created.is_some())
            .field("read_loop", &self.read_loop)
            .field("write", &self.write)
            .finish()
    }
}

#[derive(Debug, Default)]
struct ReadSide {
    reader: Option<ReaderHandle>,
    closed: Option<ClosedMarker>,
}

/// State shared between a connection and its read loop.
#[derive(Debug)]
pub(crate) struct SessionState {
    keep_reading: AtomicBool,
    read_side: Mutex<ReadSide>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            keep_reading: AtomicBool::new(true),
            read_side: Mutex::new(ReadSide::default()),
        }
    }

    pub(crate) fn keep_reading(&self) -> bool {
        self.keep_reading.load(Ordering::SeqCst)
    }

    /// Build the pipe of a new iteration with `build` and publish its reader
    /// and marker. Returns `None` without building once reading has stopped.
    ///
    /// Runs under the read-side lock, so a concurrent `cancel()` or `abort()`
    /// either prevents the pipe or waits on its marker.
    pub(crate) fn begin<F>(&self, build: F) -> Result<Option<InboundPipe>, PortError>
    where
        F: FnOnce() -> Result<InboundPipe, PortError>,
    {
        let mut side = self.read_side.lock();
        if !self.keep_reading() {
            return Ok(None);
        }
        let pipe = build()?;
        side.reader = Some(pipe.reader.handle().clone());
        side.closed = Some(pipe.closed.clone());
        Ok(Some(pipe))
    }

    /// Withdraw the reader of `generation`, leaving a newer one alone.
    pub(crate) fn withdraw(&self, generation: u64) {
        let mut side = self.read_side.lock();
        if side
            .reader
            .as_ref()
            .is_some_and(|r| r.generation() == generation)
        {
            side.reader = None;
        }
    }

    /// Stop reading and cancel the held reader, if any.
    fn stop_reading(&self) -> Option<ClosedMarker> {
        let side = self.read_side.lock();
        self.keep_reading.store(false, Ordering::SeqCst);
        if let Some(reader) = &side.reader {
            reader.cancel();
        }
        side.closed.clone()
    }

    fn reader(&self) -> Option<ReaderHandle> {
        self.read_side.lock().reader.clone()
    }

    fn readable_closed(&self) -> Option<ClosedMarker> {
        self.read_side.lock().closed.clone()
    }
}

/// What a read loop started through [`Connection::start`] gets to work with.
#[derive(Debug, Clone)]
pub struct LoopContext {
    port: Arc<PortHandle>,
    signal: AbortSignal,
    state: Arc<SessionState>,
}

impl LoopContext {
    pub fn port(&self) -> &PortHandle {
        &self.port
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// Whether the loop should build another pipeline.
    pub fn keep_reading(&self) -> bool {
        self.state.keep_reading()
    }

    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }
}

/// A live session over one open port.
///
/// Dropping the connection aborts it.
pub struct Connection {
    port: Arc<PortHandle>,
    signal: AbortSignal,
    writer: Option<OutboundWriter>,
    writable_closed: ClosedMarker,
    state: Arc<SessionState>,
    stopped: Option<ClosedMarker>,
}

impl Connection {
    /// Take over `port`, lock its outbound stream and start the outbound
    /// pipe. Without an outbound stream there is no writer and the outbound
    /// marker is settled from the start.
    pub fn new(port: PortHandle, settings: &WriteConfig) -> Result<Self, ConnectionError> {
        let port = Arc::new(port);
        let signal = AbortSignal::new();

        let (writer, writable_closed) = if port.is_writable() {
            let (writer, closed) = writer::spawn_outbound_pipe(&port, &signal, settings)?;
            (Some(writer), closed)
        } else {
            (None, ClosedMarker::settled(Ok(())))
        };

        debug!(port = %port.name(), writable = writer.is_some(), "connection created");
        Ok(Self {
            port,
            signal,
            writer,
            writable_closed,
            state: Arc::new(SessionState::new()),
            stopped: None,
        })
    }

    /// Queue `text` for the device.
    pub async fn write(&self, text: &str) -> Result<(), ConnectionError> {
        match &self.writer {
            Some(writer) => writer.write(text).await,
            None => Err(ConnectionError::WriterClosed),
        }
    }

    /// Spawn the read loop built by `factory`. Its result becomes the outcome
    /// of [`stopped`](Self::stopped).
    pub fn start<F, Fut>(&mut self, factory: F) -> Result<(), ConnectionError>
    where
        F: FnOnce(LoopContext) -> Fut,
        Fut: Future<Output = Result<(), ConnectionError>> + Send + 'static,
    {
        if self.stopped.is_some() {
            return Err(ConnectionError::AlreadyStarted);
        }
        let context = LoopContext {
            port: Arc::clone(&self.port),
            signal: self.signal.clone(),
            state: Arc::clone(&self.state),
        };
        let (setter, stopped) = ClosedMarker::pending();
        let task = factory(context);
        tokio::spawn(async move {
            setter.settle(task.await);
        });
        self.stopped = Some(stopped);
        Ok(())
    }

    /// Hard stop: fire the abort signal and wait for both pipes to close.
    /// In-flight data is dropped. Pipe errors are not reported.
    pub async fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.state.keep_reading.store(false, Ordering::SeqCst);
        if self.signal.abort(reason.as_str()) {
            info!(port = %self.port.name(), %reason, "connection aborted");
        }
        // Taken after the store: a pipe built concurrently is published by now.
        if let Some(closed) = self.state.readable_closed() {
            let _ = closed.wait().await;
        }
        let _ = self.writable_closed.wait().await;
    }

    /// Graceful stop: end the current reader and close the writer after
    /// flushing what was already queued. The abort signal is not fired.
    pub async fn cancel(&self) {
        if let Some(closed) = self.state.stop_reading() {
            let _ = closed.wait().await;
        }
        if let Some(writer) = &self.writer {
            let _ = writer.close().await;
        }
        let _ = self.writable_closed.wait().await;
        info!(port = %self.port.name(), "connection cancelled");
    }

    /// Wait for the read loop to exit and return its outcome. Returns at once
    /// when no loop was started.
    pub async fn stopped(&self) -> Result<(), ConnectionError> {
        match &self.stopped {
            Some(stopped) => stopped.wait().await,
            None => Ok(()),
        }
    }

    pub fn port(&self) -> &PortHandle {
        &self.port
    }

    pub fn keep_reading(&self) -> bool {
        self.state.keep_reading()
    }

    /// Allow or forbid further read-loop iterations. Does not touch the
    /// current pipeline.
    pub fn set_keep_reading(&self, keep_reading: bool) {
        self.state.keep_reading.store(keep_reading, Ordering::SeqCst);
    }

    pub fn writer(&self) -> Option<&OutboundWriter> {
        self.writer.as_ref()
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// The reader of the current iteration, if one is held.
    pub fn reader(&self) -> Option<ReaderHandle> {
        self.state.reader()
    }

    /// Marker of the most recent inbound pipe.
    pub fn readable_closed(&self) -> Option<ClosedMarker> {
        self.state.readable_closed()
    }

    pub fn writable_closed(&self) -> &ClosedMarker {
        &self.writable_closed
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("port", &self.port.name())
            .field("keep_reading", &self.keep_reading())
            .field("aborted", &self.signal.is_aborted())
            .field("writer", &self.writer.is_some())
            .field("started", &self.stopped.is_some())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.state.keep_reading.store(false, Ordering::SeqCst);
        self.signal.abort("connection dropped");
    }
}

/// Build a connection over an open port and start reading from it.
///
/// Runs the writer-created callback before the read loop starts, so the
/// caller has its writer before the first chunk arrives.
pub async fn connect_serial_port<C>(
    port: PortHandle,
    consumer: C,
    options: ConnectOptions,
) -> Result<Connection, ConnectionError>
where
    C: ChunkConsumer + 'static,
{
    let ConnectOptions {
        on_error,
        on_reader_created,
        on_writer_created,
        read_loop: settings,
        write,
    } = options;

    let mut connection = Connection::new(port, &write)?;
    if let Some(on_writer_created) = on_writer_created {
        on_writer_created(connection.writer().cloned()).await;
    }

    let callbacks = ReadCallbacks {
        on_error,
        on_reader_created,
    };
    connection.start(move |context| read_loop::run(context, consumer, callbacks, settings))?;
    info!(port = %connection.port().name(), "connected");
    Ok(connection)
}

/// Open `port` with `config`, then run `on_open`.
///
/// Fails with [`PortError::AlreadyOpen`] if either direction is already
/// present.
pub async fn open_serial_port(
    port: &mut PortHandle,
    config: &PortConfiguration,
    on_open: Option<PortOpenCallback>,
) -> Result<(), PortError> {
    if port.is_readable() || port.is_writable() {
        return Err(PortError::AlreadyOpen);
    }
    port.open(config).await?;
    if let Some(on_open) = on_open {
        on_open(port);
    }
    Ok(())
}
