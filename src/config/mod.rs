//! Configuration module for serial-link.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_LINK_CONFIG` environment variable (explicit path)
//! 2. `./serial-link.toml` (current directory)
//! 3. `serial-link.toml` in the platform config directory
//!    (`~/.config/serial-link/` on Linux, `%APPDATA%\serial-link\config\` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `SERIAL_LINK_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_LINK_SERIAL_BAUD_RATE=9600`
//! - `SERIAL_LINK_READ_LOOP_MAX_IDLE_RESTARTS=0`
//! - `SERIAL_LINK_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_link::config::ConfigLoader;
//!
//! # fn main() -> Result<(), serial_link::config::ConfigError> {
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Baud rate: {}", config.serial.baud_rate);
//! println!("Block size: {}", config.read_loop.block_size);
//! # Ok(())
//! # }
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{
    Config, LogFormat, LoggingConfig, ReadLoopConfig, SerialConfig, WriteConfig,
};
