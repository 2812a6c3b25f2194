//! Errors raised while loading, validating or saving configuration.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the schema.
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("cannot write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A setting holds a value the link cannot run with.
    #[error("{key} {message}")]
    Invalid { key: String, message: String },

    #[error("{var}: {message}")]
    Env { var: String, message: String },

    /// `save` was called on a loader built from defaults.
    #[error("config was not loaded from a file, use save_to")]
    NoSavePath,
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            message: message.into(),
        }
    }

    pub(crate) fn read(path: &Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_message_names_the_key() {
        let err = ConfigError::invalid("write.queue_capacity", "must be > 0");
        assert_eq!(err.to_string(), "write.queue_capacity must be > 0");
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let source = toml::from_str::<toml::Value>("= nope").unwrap_err();
        let err = ConfigError::Parse {
            path: PathBuf::from("serial-link.toml"),
            source,
        };
        assert!(err.to_string().starts_with("invalid config file serial-link.toml: "));
    }
}
