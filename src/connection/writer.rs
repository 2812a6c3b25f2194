//! Outbound pipe: text encoder → port outbound stream.

use super::marker::{ClosedMarker, PipeOutcome};
use super::signal::AbortSignal;
use crate::config::WriteConfig;
use crate::error::ConnectionError;
use crate::port::{BoxedWriter, Direction, PortError, PortHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum Outbound {
    Write {
        bytes: Vec<u8>,
        done: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Close,
}

/// The single writer of a connection's outbound stream.
///
/// Clones feed the same queue, so writes reach the port in the order the
/// calls were made and never interleave.
#[derive(Debug, Clone)]
pub struct OutboundWriter {
    tx: mpsc::Sender<Outbound>,
    closing: Arc<AtomicBool>,
    signal: AbortSignal,
}

impl OutboundWriter {
    /// Encode `text` as UTF-8 and write it, resolving once the bytes have
    /// been handed to the port and flushed.
    pub async fn write(&self, text: &str) -> Result<(), ConnectionError> {
        self.write_bytes(text.as_bytes().to_vec()).await
    }

    /// Write raw bytes, bypassing the encoder.
    pub async fn write_bytes(&self, bytes: Vec<u8>) -> Result<(), ConnectionError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }
        let (done, ack) = oneshot::channel();
        self.tx
            .send(Outbound::Write { bytes, done })
            .await
            .map_err(|_| self.closed_error())?;
        ack.await.unwrap_or_else(|_| Err(self.closed_error()))
    }

    /// Close the outbound stream after every write queued so far has been
    /// flushed. Later writes fail with [`ConnectionError::WriterClosed`].
    pub async fn close(&self) -> Result<(), ConnectionError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.tx
            .send(Outbound::Close)
            .await
            .map_err(|_| self.closed_error())
    }

    /// Whether the writer no longer accepts data.
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    fn closed_error(&self) -> ConnectionError {
        if self.signal.is_aborted() {
            self.signal.error()
        } else {
            ConnectionError::WriterClosed
        }
    }
}

/// Lock the port's outbound stream once and start the pipe feeding it.
pub(crate) fn spawn_outbound_pipe(
    port: &PortHandle,
    signal: &AbortSignal,
    settings: &WriteConfig,
) -> Result<(OutboundWriter, ClosedMarker), PortError> {
    let mut sink = port.lock_outbound()?;
    let (tx, mut rx) = mpsc::channel(settings.queue_capacity.max(1));
    let (setter, closed) = ClosedMarker::pending();
    let port_name = port.name().to_string();

    let task_signal = signal.clone();
    tokio::spawn(async move {
        let outcome = tokio::select! {
            biased;
            error = task_signal.aborted() => Err(error),
            outcome = drain(&mut sink, &mut rx) => outcome,
        };

        // Queued writes that never ran see their acknowledgement dropped.
        rx.close();
        drop(rx);

        match &outcome {
            Ok(()) => debug!(port = %port_name, "outbound pipe closed"),
            Err(error) if error.is_abort() => {
                debug!(port = %port_name, %error, "outbound pipe aborted");
            }
            Err(error) => {
                warn!(port = %port_name, %error, "outbound pipe failed");
                if error.is_link_lost() {
                    sink.retire();
                }
            }
        }
        drop(sink);
        setter.settle(outcome);
    });

    let writer = OutboundWriter {
        tx,
        closing: Arc::new(AtomicBool::new(false)),
        signal: signal.clone(),
    };
    Ok((writer, closed))
}

async fn drain(sink: &mut BoxedWriter, rx: &mut mpsc::Receiver<Outbound>) -> PipeOutcome {
    while let Some(message) = rx.recv().await {
        match message {
            Outbound::Write { bytes, done } => {
                let result = write_block(sink, &bytes).await;
                let _ = done.send(result.clone());
                result?;
            }
            Outbound::Close => return shutdown(sink).await,
        }
    }
    // Every writer handle was dropped.
    shutdown(sink).await
}

async fn write_block(sink: &mut BoxedWriter, bytes: &[u8]) -> PipeOutcome {
    sink.write_all(bytes)
        .await
        .map_err(|e| ConnectionError::io(Direction::Outbound, e))?;
    sink.flush()
        .await
        .map_err(|e| ConnectionError::io(Direction::Outbound, e))
}

async fn shutdown(sink: &mut BoxedWriter) -> PipeOutcome {
    sink.shutdown()
        .await
        .map_err(|e| ConnectionError::io(Direction::Outbound, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockSerialPort, PortConfiguration};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn open_port() -> (MockSerialPort, PortHandle) {
        let device = MockSerialPort::new("MOCK0");
        let mut port = device.handle();
        port.open(&PortConfiguration::default()).await.unwrap();
        (device, port)
    }

    #[tokio::test]
    async fn test_outbound_is_locked_once() {
        let (_device, port) = open_port().await;
        let signal = AbortSignal::new();
        let _pipe = spawn_outbound_pipe(&port, &signal, &WriteConfig::default()).unwrap();
        assert!(matches!(
            spawn_outbound_pipe(&port, &signal, &WriteConfig::default()),
            Err(PortError::Locked(Direction::Outbound))
        ));
    }

    #[tokio::test]
    async fn test_writes_keep_call_order() {
        let (device, port) = open_port().await;
        let signal = AbortSignal::new();
        let (writer, closed) =
            spawn_outbound_pipe(&port, &signal, &WriteConfig::default()).unwrap();

        for text in ["one ", "two ", "three"] {
            writer.write(text).await.unwrap();
        }
        writer.close().await.unwrap();
        closed.wait().await.unwrap();

        assert_eq!(device.written(), b"one two three");
        assert_eq!(device.shutdown_after_writes(), Some(3));
        assert!(port.lock_outbound().is_ok());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (_device, port) = open_port().await;
        let signal = AbortSignal::new();
        let (writer, _closed) =
            spawn_outbound_pipe(&port, &signal, &WriteConfig::default()).unwrap();

        writer.close().await.unwrap();
        assert!(writer.is_closed());
        assert!(matches!(
            writer.write("late").await,
            Err(ConnectionError::WriterClosed)
        ));
        // Closing twice is harmless.
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_abort_settles_stalled_write() {
        let (device, port) = open_port().await;
        device.set_write_stalled(true);
        let signal = AbortSignal::new();
        let (writer, closed) =
            spawn_outbound_pipe(&port, &signal, &WriteConfig::default()).unwrap();

        let pending = tokio::spawn({
            let writer = writer.clone();
            async move { writer.write("stuck").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        signal.abort("teardown");
        let result = timeout(Duration::from_secs(2), pending).await.unwrap().unwrap();
        assert!(matches!(result, Err(ConnectionError::Aborted(ref r)) if r == "teardown"));
        assert!(matches!(
            closed.wait().await,
            Err(ConnectionError::Aborted(_))
        ));
        assert!(device.written().is_empty());
    }
}
