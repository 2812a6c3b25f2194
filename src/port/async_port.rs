//! Serial port opener backed by tokio-serial.
//!
//! Opens a native async serial stream and splits it into the inbound and
//! outbound halves a [`PortHandle`] expects.
//!
//! Note: This module is gated behind the `async-serial` feature flag.

use super::error::PortError;
use super::handle::PortHandle;
use super::traits::{BoxedReader, BoxedWriter, PortConfiguration, PortOpener};
use async_trait::async_trait;

/// Opens real serial devices through `tokio_serial::SerialStream`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSerialOpener;

impl TokioSerialOpener {
    /// Create a closed handle for the device at `port_name`.
    ///
    /// # Example
    /// ```no_run
    /// use serial_link::port::{PortConfiguration, TokioSerialOpener};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut port = TokioSerialOpener::handle("/dev/ttyUSB0");
    /// port.open(&PortConfiguration::default()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn handle(port_name: impl Into<String>) -> PortHandle {
        PortHandle::new(port_name, Self)
    }
}

#[async_trait]
impl PortOpener for TokioSerialOpener {
    async fn open(
        &mut self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<(BoxedReader, BoxedWriter), PortError> {
        let builder = tokio_serial::new(port_name, config.baud_rate)
            .data_bits(convert_data_bits(config.data_bits))
            .flow_control(convert_flow_control(config.flow_control))
            .parity(convert_parity(config.parity))
            .stop_bits(convert_stop_bits(config.stop_bits))
            .timeout(config.timeout);

        let stream = tokio_serial::SerialStream::open(&builder).map_err(|e| match e.kind {
            tokio_serial::ErrorKind::NoDevice => PortError::not_found(port_name),
            tokio_serial::ErrorKind::InvalidInput => PortError::config(e.to_string()),
            _ => PortError::Io(std::io::Error::other(e.to_string())),
        })?;

        let (reader, writer) = tokio::io::split(stream);
        Ok((Box::new(reader), Box::new(writer)))
    }
}

// Helper conversion functions for tokio-serial types

fn convert_data_bits(bits: super::traits::DataBits) -> tokio_serial::DataBits {
    use super::traits::DataBits;
    match bits {
        DataBits::Five => tokio_serial::DataBits::Five,
        DataBits::Six => tokio_serial::DataBits::Six,
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn convert_flow_control(flow: super::traits::FlowControl) -> tokio_serial::FlowControl {
    use super::traits::FlowControl;
    match flow {
        FlowControl::None => tokio_serial::FlowControl::None,
        FlowControl::Software => tokio_serial::FlowControl::Software,
        FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
    }
}

fn convert_parity(parity: super::traits::Parity) -> tokio_serial::Parity {
    use super::traits::Parity;
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

fn convert_stop_bits(stop_bits: super::traits::StopBits) -> tokio_serial::StopBits {
    use super::traits::StopBits;
    match stop_bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}
