//! Serial Link Library
//!
//! Duplex text transport over one serial port. The read side decodes inbound
//! bytes into text chunks through a pipeline that is rebuilt every time it
//! ends or faults; the write side is a single ordered writer that lives for
//! the whole session. Both share one abort signal.
//!
//! # Modules
//!
//! - `port`: lockable port handle, openers for tokio-serial and a mock device
//! - `connection`: the session, its pipes, abort signal and closed markers
//! - `read_loop`: the supervised inbound restart loop
//! - `transform`: streaming UTF-8 decode of inbound blocks
//! - `device`: USB vendor/product identification
//! - `config`: configuration with TOML support
//! - `logging`: tracing subscriber setup
//! - `error`: connection errors

pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod logging;
pub mod port;
pub mod read_loop;
pub mod transform;

// Re-export commonly used types for convenience
pub use connection::{
    connect_serial_port, open_serial_port, AbortSignal, ChunkConsumer, ChunkReader, ClosedMarker,
    ConnectOptions, Connection, LoopContext, OutboundWriter, ReaderHandle,
};
pub use device::{identify_usb_device, usb_id_hex_to_int, usb_id_int_to_hex, UsbDeviceInfo};
pub use error::{ConnectionError, ConsumerError, ErrorSource};
pub use port::{
    DataBits, Direction, FlowControl, MockSerialPort, Parity, PortConfiguration, PortError,
    PortHandle, PortOpener, StopBits,
};
pub use transform::{DecodeTransform, DecodedChunk, Utf8StreamDecoder};

#[cfg(feature = "async-serial")]
pub use port::TokioSerialOpener;

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
