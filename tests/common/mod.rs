//! Shared test utilities for serial-link integration tests.
//!
//! This module provides:
//! - An opened mock device/handle pair
//! - A channel-backed chunk consumer
//! - Timeout helpers so a hung pipeline fails the test instead of blocking it

#![allow(dead_code)]

use serial_link::{
    ChunkConsumer, ConsumerError, DecodedChunk, MockSerialPort, PortConfiguration, PortHandle,
};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long a test waits for something that should happen promptly.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// Receiving end of a [`ChannelConsumer`].
pub type ChunkRx = mpsc::UnboundedReceiver<DecodedChunk>;

/// Create a mock device and an opened handle onto it.
pub async fn open_mock_port(name: &str) -> (MockSerialPort, PortHandle) {
    let device = MockSerialPort::new(name);
    let mut port = device.handle();
    serial_link::open_serial_port(&mut port, &PortConfiguration::default(), None)
        .await
        .expect("mock port opens");
    (device, port)
}

/// Consumer that forwards every chunk into a channel.
pub struct ChannelConsumer {
    tx: mpsc::UnboundedSender<DecodedChunk>,
}

impl ChannelConsumer {
    pub fn new() -> (Self, ChunkRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ChunkConsumer for ChannelConsumer {
    async fn on_chunk(&mut self, chunk: DecodedChunk) -> Result<(), ConsumerError> {
        self.tx.send(chunk).map_err(|_| "test receiver dropped".into())
    }
}

/// Await `future`, failing the test if it takes longer than [`STEP_TIMEOUT`].
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(STEP_TIMEOUT, future)
        .await
        .expect("operation timed out")
}

/// Next delivered chunk.
pub async fn next_chunk(rx: &mut ChunkRx) -> DecodedChunk {
    within(rx.recv()).await.expect("consumer channel closed")
}

/// Collect chunk text until it adds up to `expected`.
pub async fn collect_text(rx: &mut ChunkRx, expected: &str) -> String {
    let mut text = String::new();
    while text.len() < expected.len() {
        text.push_str(next_chunk(rx).await.text());
    }
    text
}

/// Poll `condition` until it holds, failing after [`STEP_TIMEOUT`].
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
