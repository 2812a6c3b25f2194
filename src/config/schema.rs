//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! Every section has defaults, so a partial file (or none at all) is valid.

use super::error::{ConfigError, ConfigResult};
use crate::port::{DataBits, FlowControl, Parity, PortConfiguration, StopBits};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port settings
    pub serial: SerialConfig,
    /// Read loop tuning
    pub read_loop: ReadLoopConfig,
    /// Outbound pipe tuning
    pub write: WriteConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the pipelines cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::invalid("serial.baud_rate", "must be > 0"));
        }
        if self.read_loop.block_size == 0 {
            return Err(ConfigError::invalid("read_loop.block_size", "must be > 0"));
        }
        if self.read_loop.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "read_loop.queue_capacity",
                "must be > 0",
            ));
        }
        if self.write.queue_capacity == 0 {
            return Err(ConfigError::invalid("write.queue_capacity", "must be > 0"));
        }
        Ok(())
    }
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Per-operation timeout in milliseconds
    pub timeout_ms: u64,
    /// Port aliases for convenience
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout_ms: 1000,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The settings to open a port with.
    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            flow_control: self.flow_control,
            parity: self.parity,
            stop_bits: self.stop_bits,
            timeout: self.timeout(),
        }
    }
}

/// Read loop tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadLoopConfig {
    /// Largest block read from the inbound stream at once
    pub block_size: usize,
    /// Decoded chunks buffered between the pipe and the reader
    pub queue_capacity: usize,
    /// Consecutive pipelines without data before the loop gives up (0, the default, never gives up)
    pub max_idle_restarts: u32,
}

impl Default for ReadLoopConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            queue_capacity: 1,
            max_idle_restarts: 0,
        }
    }
}

/// Outbound pipe tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig {
    /// Writes that may wait for the pipe before `write` blocks
    pub queue_capacity: usize,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self { queue_capacity: 32 }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line format with colors
    #[default]
    Pretty,
    /// Single-line format
    Compact,
}
