//! Supervised read loop.
//!
//! Every iteration builds a fresh decode transform, pipes the port's inbound
//! stream through it, and pumps the decoded chunks into the consumer until
//! end-of-stream or a read error. The reader is then released and the loop
//! starts over for as long as the port stays readable and the connection
//! keeps reading.

use crate::config::ReadLoopConfig;
use crate::connection::{
    pipe_inbound, ChunkConsumer, ChunkReader, ErrorCallback, InboundPipe, LoopContext,
    ReaderCreatedCallback,
};
use crate::error::{ConnectionError, ErrorSource};
use crate::port::PortError;
use crate::transform::DecodeTransform;
use tracing::{debug, warn};

/// Callbacks the read loop invokes.
#[derive(Default)]
pub struct ReadCallbacks {
    pub on_error: Option<ErrorCallback>,
    pub on_reader_created: Option<ReaderCreatedCallback>,
}

/// Run the read loop until it is told to stop or the inbound stream is gone.
///
/// Returns the consumer's error if it failed. With a non-zero
/// `max_idle_restarts` the loop also gives up with
/// [`ConnectionError::RestartLimit`] once that many pipelines in a row ended
/// without delivering anything; by default it rebuilds indefinitely.
pub async fn run<C>(
    context: LoopContext,
    mut consumer: C,
    mut callbacks: ReadCallbacks,
    settings: ReadLoopConfig,
) -> Result<(), ConnectionError>
where
    C: ChunkConsumer,
{
    let port = context.port();
    let mut generation = 0u64;
    let mut idle_restarts = 0u32;

    loop {
        if !port.is_readable() || !context.keep_reading() {
            debug!(port = %port.name(), generation, "read loop finished");
            return Ok(());
        }
        generation += 1;

        let pipe = context.state().begin(|| {
            pipe_inbound(
                port,
                DecodeTransform::new(),
                generation,
                context.signal(),
                &settings,
                callbacks.on_error.clone(),
            )
        });
        let InboundPipe { mut reader, closed } = match pipe {
            Ok(Some(pipe)) => pipe,
            Ok(None) => {
                debug!(port = %port.name(), generation, "read loop stopped before building");
                return Ok(());
            }
            // Retired between the guard and the lock.
            Err(PortError::NotOpen) => return Ok(()),
            Err(error) => return Err(error.into()),
        };
        debug!(port = %port.name(), generation, "inbound pipeline built");

        let handle = reader.handle().clone();
        if let Some(on_reader_created) = callbacks.on_reader_created.as_mut() {
            on_reader_created(handle).await;
        }

        let pumped = pump(&mut reader, &mut consumer, callbacks.on_error.as_ref()).await;

        drop(reader);
        context.state().withdraw(generation);
        // The inbound slot must be free before the next pipe locks it.
        let _ = closed.wait().await;

        if pumped? > 0 {
            idle_restarts = 0;
        } else if context.keep_reading() {
            idle_restarts += 1;
            if settings.max_idle_restarts > 0 && idle_restarts >= settings.max_idle_restarts {
                warn!(
                    port = %port.name(),
                    restarts = idle_restarts,
                    "inbound pipeline keeps ending without data, giving up"
                );
                return Err(ConnectionError::RestartLimit(idle_restarts));
            }
        }
    }
}

/// Deliver chunks until end-of-stream or a read error. Returns how many
/// chunks the consumer accepted; only consumer errors escape.
async fn pump<C>(
    reader: &mut ChunkReader,
    consumer: &mut C,
    on_error: Option<&ErrorCallback>,
) -> Result<usize, ConnectionError>
where
    C: ChunkConsumer,
{
    let generation = reader.handle().generation();
    let mut delivered = 0;
    loop {
        match reader.read().await {
            Ok(Some(chunk)) => {
                consumer
                    .on_chunk(chunk)
                    .await
                    .map_err(ConnectionError::consumer)?;
                delivered += 1;
            }
            Ok(None) => {
                debug!(generation, delivered, "inbound end of stream");
                return Ok(delivered);
            }
            Err(error) => {
                match on_error {
                    Some(on_error) => on_error(&error, ErrorSource::ReadingLoop),
                    None => warn!(generation, %error, "read failed, rebuilding pipeline"),
                }
                return Ok(delivered);
            }
        }
    }
}
