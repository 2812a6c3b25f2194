//! Inbound pipe: port inbound stream → decode transform → chunk reader.

use super::marker::{ClosedMarker, PipeOutcome};
use super::signal::AbortSignal;
use super::ErrorCallback;
use crate::config::ReadLoopConfig;
use crate::error::{ConnectionError, ErrorSource};
use crate::port::{BoxedReader, Direction, PortError, PortHandle};
use crate::transform::{DecodeTransform, DecodedChunk};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type ChunkResult = Result<DecodedChunk, ConnectionError>;

/// Cancellation handle for the reader of one pipeline.
///
/// Cloned onto the connection so `cancel()` can end the current pipeline
/// from outside the read loop.
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    generation: u64,
    token: CancellationToken,
}

impl ReaderHandle {
    /// Which pipeline this reader belongs to, counting from 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ask the reader to stop. A pending read resolves as end-of-stream and
    /// the pipe feeding it closes; the session's abort signal is untouched.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Exclusive reader over one transform's output.
///
/// Dropping it releases the transform: the pipe notices, stops, and gives the
/// port's inbound stream back.
#[derive(Debug)]
pub struct ChunkReader {
    rx: mpsc::Receiver<ChunkResult>,
    handle: ReaderHandle,
    signal: AbortSignal,
}

impl ChunkReader {
    pub fn handle(&self) -> &ReaderHandle {
        &self.handle
    }

    /// Read the next chunk. `Ok(None)` means end-of-stream.
    pub async fn read(&mut self) -> Result<Option<DecodedChunk>, ConnectionError> {
        tokio::select! {
            biased;
            () = self.handle.token.cancelled() => {
                if self.signal.is_aborted() {
                    Err(self.signal.error())
                } else {
                    Ok(None)
                }
            }
            item = self.rx.recv() => item.transpose(),
        }
    }
}

/// A running inbound pipe and the reader over its output.
#[derive(Debug)]
pub(crate) struct InboundPipe {
    pub reader: ChunkReader,
    pub closed: ClosedMarker,
}

/// Lock the port's inbound stream and pipe it through `transform`.
///
/// The pipe runs until the source ends or faults, the reader is dropped or
/// cancelled, or the session is aborted. The inbound lock is released before
/// the returned marker settles.
pub(crate) fn pipe_inbound(
    port: &PortHandle,
    transform: DecodeTransform,
    generation: u64,
    signal: &AbortSignal,
    settings: &ReadLoopConfig,
    on_error: Option<ErrorCallback>,
) -> Result<InboundPipe, PortError> {
    let mut source = port.lock_inbound()?;
    let token = signal.child_token();
    let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
    let (setter, closed) = ClosedMarker::pending();
    let block_size = settings.block_size.max(1);
    let port_name = port.name().to_string();

    let task_token = token.clone();
    let task_signal = signal.clone();
    tokio::spawn(async move {
        let outcome = run_pipe(
            &mut source,
            transform,
            &tx,
            &task_token,
            &task_signal,
            block_size,
        )
        .await;
        drop(tx);

        if let Err(error) = &outcome {
            if error.is_link_lost() {
                warn!(port = %port_name, generation, %error, "inbound stream lost");
                source.retire();
            }
        }
        drop(source);

        let outcome = match (outcome, on_error) {
            (Err(error), Some(on_error)) => {
                on_error(&error, ErrorSource::ReadableStream);
                Ok(())
            }
            (Err(error), None) => {
                if !error.is_abort() {
                    warn!(port = %port_name, generation, %error, "inbound pipe failed");
                }
                Err(error)
            }
            (Ok(()), _) => {
                debug!(port = %port_name, generation, "inbound pipe closed");
                Ok(())
            }
        };
        setter.settle(outcome);
    });

    Ok(InboundPipe {
        reader: ChunkReader {
            rx,
            handle: ReaderHandle { generation, token },
            signal: signal.clone(),
        },
        closed,
    })
}

async fn run_pipe(
    source: &mut BoxedReader,
    mut transform: DecodeTransform,
    tx: &mpsc::Sender<ChunkResult>,
    token: &CancellationToken,
    signal: &AbortSignal,
    block_size: usize,
) -> PipeOutcome {
    let mut block = vec![0u8; block_size];
    loop {
        let read = tokio::select! {
            biased;
            () = token.cancelled() => return stopped(signal),
            () = tx.closed() => return Ok(()),
            read = source.read(&mut block) => read,
        };

        match read {
            Ok(0) => {
                if let Some(tail) = transform.flush() {
                    if let Some(outcome) = forward(tx, token, signal, Ok(tail)).await {
                        return outcome;
                    }
                }
                return Ok(());
            }
            Ok(n) => {
                let chunk = transform.transform(&block[..n]);
                if let Some(outcome) = forward(tx, token, signal, Ok(chunk)).await {
                    return outcome;
                }
            }
            Err(err) => {
                let error = ConnectionError::io(Direction::Inbound, err);
                // The reader sees the fault as a failed read.
                let _ = forward(tx, token, signal, Err(error.clone())).await;
                return Err(error);
            }
        }
    }
}

/// Hand one item to the reader. `Some` means the pipe must stop with that
/// outcome.
async fn forward(
    tx: &mpsc::Sender<ChunkResult>,
    token: &CancellationToken,
    signal: &AbortSignal,
    item: ChunkResult,
) -> Option<PipeOutcome> {
    tokio::select! {
        biased;
        () = token.cancelled() => Some(stopped(signal)),
        sent = tx.send(item) => match sent {
            Ok(()) => None,
            // Reader released.
            Err(_) => Some(Ok(())),
        },
    }
}

fn stopped(signal: &AbortSignal) -> PipeOutcome {
    if signal.is_aborted() {
        Err(signal.error())
    } else {
        Ok(())
    }
}
