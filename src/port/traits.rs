//! Core traits and configuration for port abstraction.
//!
//! Defines the `PortOpener` trait that lets real serial ports and in-memory
//! mocks hand their byte streams to a [`PortHandle`](super::PortHandle)
//! interchangeably.

use super::error::PortError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Inbound byte stream of an open port.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Outbound byte stream of an open port.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Configuration parameters for a serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Driver-level read/write timeout.
    pub timeout: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

/// Source of byte streams for a port handle.
///
/// Implemented by the tokio-serial backed opener for real hardware and by
/// [`MockSerialPort`](super::MockSerialPort) for tests. Each successful call
/// yields a fresh inbound/outbound pair.
#[async_trait]
pub trait PortOpener: Send + Sync + std::fmt::Debug {
    /// Open the device named `port_name` with the given configuration.
    async fn open(
        &mut self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<(BoxedReader, BoxedWriter), PortError>;
}
