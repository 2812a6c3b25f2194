//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_LINK";

/// Config file name
const CONFIG_FILE_NAME: &str = "serial-link.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_LINK_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_LINK_CONFIG` environment variable (explicit path)
    /// 2. `./serial-link.toml` (current directory)
    /// 3. `serial-link.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values, and the result is
    /// validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if apply_env_overrides(&mut config).is_err() || config.validate().is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to the file it was loaded from.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or(ConfigError::NoSavePath)?;
        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    get_default_config_path().filter(|path| path.exists())
}

/// The platform config directory for this application.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "serial-link").map(|dirs| dirs.config_dir().to_path_buf())
}

/// The default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::write(path, e))?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write(path, e))
}

/// Parse `SERIAL_LINK_<key>` into `target` if it is set.
fn override_from_env<T: FromStr>(key: &str, target: &mut T, message: &str) -> ConfigResult<()> {
    let var = format!("{ENV_PREFIX}_{key}");
    if let Ok(val) = std::env::var(&var) {
        *target = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::env(var, message))?;
    }
    Ok(())
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SERIAL_LINK_<SECTION>_<KEY>`
/// For example:
/// - `SERIAL_LINK_SERIAL_BAUD_RATE=9600`
/// - `SERIAL_LINK_READ_LOOP_BLOCK_SIZE=256`
/// - `SERIAL_LINK_LOGGING_LEVEL=debug`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    override_from_env(
        "SERIAL_BAUD_RATE",
        &mut config.serial.baud_rate,
        "Invalid baud rate",
    )?;
    override_from_env(
        "SERIAL_TIMEOUT_MS",
        &mut config.serial.timeout_ms,
        "Invalid timeout",
    )?;

    override_from_env(
        "READ_LOOP_BLOCK_SIZE",
        &mut config.read_loop.block_size,
        "Invalid block size",
    )?;
    override_from_env(
        "READ_LOOP_QUEUE_CAPACITY",
        &mut config.read_loop.queue_capacity,
        "Invalid queue capacity",
    )?;
    override_from_env(
        "READ_LOOP_MAX_IDLE_RESTARTS",
        &mut config.read_loop.max_idle_restarts,
        "Invalid restart count",
    )?;

    override_from_env(
        "WRITE_QUEUE_CAPACITY",
        &mut config.write.queue_capacity,
        "Invalid queue capacity",
    )?;

    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
        config.logging.level = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baud_rate, 115200);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("SERIAL_LINK_SERIAL_BAUD_RATE", "57600");
        env::set_var("SERIAL_LINK_READ_LOOP_BLOCK_SIZE", "128");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baud_rate, 57600);
        assert_eq!(loader.config().read_loop.block_size, 128);

        env::remove_var("SERIAL_LINK_SERIAL_BAUD_RATE");
        env::remove_var("SERIAL_LINK_READ_LOOP_BLOCK_SIZE");
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_is_reported() {
        env::set_var("SERIAL_LINK_WRITE_QUEUE_CAPACITY", "lots");
        let mut config = Config::default();
        let result = apply_env_overrides(&mut config);
        env::remove_var("SERIAL_LINK_WRITE_QUEUE_CAPACITY");

        assert!(matches!(
            result,
            Err(ConfigError::Env { ref var, .. }) if var == "SERIAL_LINK_WRITE_QUEUE_CAPACITY"
        ));
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[read_loop]\nmax_idle_restarts = 3\n\n[write]\nqueue_capacity = 4").unwrap();

        let loader = ConfigLoader::load_from(file.path()).unwrap();
        assert_eq!(loader.config().read_loop.max_idle_restarts, 3);
        assert_eq!(loader.config().write.queue_capacity, 4);
        assert_eq!(loader.config_path.as_deref(), Some(file.path()));
    }

    #[test]
    #[serial]
    fn test_load_from_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[read_loop]\nqueue_capacity = 0").unwrap();
        assert!(matches!(
            ConfigLoader::load_from(file.path()),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut loader = ConfigLoader::with_defaults();
        loader.config.serial.baud_rate = 230400;
        loader.save_to(&path).unwrap();

        let reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config().serial.baud_rate, 230400);
    }

    #[test]
    #[serial]
    fn test_save_without_source_file_is_refused() {
        let loader = ConfigLoader::with_defaults();
        assert!(matches!(loader.save(), Err(ConfigError::NoSavePath)));
    }

    #[test]
    #[serial]
    fn test_explicit_path_env_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[serial]\nbaud_rate = 921600").unwrap();
        env::set_var(CONFIG_PATH_ENV, file.path());

        let resolved = resolve_config_path();
        env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(resolved.as_deref(), Some(file.path()));
    }
}
