//! Configuration management for the lockd server
//!
//! The configuration file named on the command line is loaded once at start-up
//! and layered with `LOCKD__` environment overrides. The resulting values are
//! handed to the lock engine and never consulted again.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File, Map};
use lockd_core::{LockDefinition, LockRegistry, SocketOptions};
use serde::de::DeserializeOwned;

use super::constants::{
    DEFAULT_KEEPALIVE_SECS, DEFAULT_LINGER_SECS, DEFAULT_LOGGING_LEVEL, DEFAULT_SERVER_ADDRESS,
    DEFAULT_SERVER_PORT, ENV_PREFIX, ENV_SEPARATOR, LEGACY_BIND_IP_KEYS, LEGACY_CPU_KEYS,
    LEGACY_LISTEN_PORT_KEYS, LEGACY_LOCKS_KEYS, LEGACY_LOG_PATH_KEYS, LOCKS_PROPERTY,
    LOGGING_CONSOLE_PROPERTY, LOGGING_DIR_PROPERTY, LOGGING_FILE_PROPERTY, LOGGING_LEVEL_PROPERTY,
    SERVER_ADDRESS_PROPERTY, SERVER_CPU_PROPERTY, SERVER_KEEPALIVE_SECS_PROPERTY,
    SERVER_LINGER_SECS_PROPERTY, SERVER_PORT_PROPERTY,
};
use crate::error::ConfigError;
use crate::startup::LoggingConfig;

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "lockd-server", version, about = "Network-accessible named-lock coordinator")]
pub struct Cli {
    /// Path to the configuration file (YAML, JSON or TOML)
    pub config: PathBuf,
}

/// Server configuration loaded from the configuration file and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load and validate the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Load with an explicit environment instead of the process environment
    pub fn load_with_env(
        path: &Path,
        env: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let configuration = Configuration { config };
        configuration.validate()?;
        Ok(configuration)
    }

    /// Check every value the server needs at start-up
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server_address()?;
        self.server_port()?;
        self.worker_threads()?;
        self.socket_options()?;
        self.lock_registry()?;
        Ok(())
    }

    // First of `key` and then `fallbacks` present in the configuration
    fn lookup<T: DeserializeOwned>(
        &self,
        key: &str,
        fallbacks: &[&str],
    ) -> Result<Option<T>, ConfigError> {
        for candidate in std::iter::once(&key).chain(fallbacks) {
            match self.config.get::<T>(candidate) {
                Ok(value) => return Ok(Some(value)),
                Err(config::ConfigError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> Result<String, ConfigError> {
        Ok(self
            .lookup(SERVER_ADDRESS_PROPERTY, LEGACY_BIND_IP_KEYS)?
            .unwrap_or(DEFAULT_SERVER_ADDRESS.to_string()))
    }

    pub fn server_port(&self) -> Result<u16, ConfigError> {
        match self.lookup::<i64>(SERVER_PORT_PROPERTY, LEGACY_LISTEN_PORT_KEYS)? {
            Some(port) => u16::try_from(port).map_err(|_| {
                ConfigError::invalid(SERVER_PORT_PROPERTY, format!("{} is not a valid port", port))
            }),
            None => Ok(DEFAULT_SERVER_PORT),
        }
    }

    /// `address:port` ready for binding; IPv6 addresses are bracketed
    pub fn bind_address(&self) -> Result<String, ConfigError> {
        let address = self.server_address()?;
        let port = self.server_port()?;

        if address.contains(':') && !address.starts_with('[') {
            Ok(format!("[{}]:{}", address, port))
        } else {
            Ok(format!("{}:{}", address, port))
        }
    }

    /// Runtime worker threads: the configured CPU hint, or every available CPU
    pub fn worker_threads(&self) -> Result<usize, ConfigError> {
        match self.lookup::<i64>(SERVER_CPU_PROPERTY, LEGACY_CPU_KEYS)? {
            Some(cpu) if cpu > 0 => Ok(cpu as usize),
            Some(cpu) => Err(ConfigError::invalid(
                SERVER_CPU_PROPERTY,
                format!("{} must be at least 1", cpu),
            )),
            None => Ok(std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)),
        }
    }

    /// Keepalive and linger for accepted sockets
    ///
    /// `keepalive_secs: 0` turns keepalive off; `linger_secs: 0` resets
    /// connections on close.
    pub fn socket_options(&self) -> Result<SocketOptions, ConfigError> {
        let keepalive =
            self.non_negative_secs(SERVER_KEEPALIVE_SECS_PROPERTY, DEFAULT_KEEPALIVE_SECS)?;
        let linger = self.non_negative_secs(SERVER_LINGER_SECS_PROPERTY, DEFAULT_LINGER_SECS)?;

        Ok(SocketOptions::default()
            .with_keepalive(Some(keepalive).filter(|idle| !idle.is_zero()))
            .with_linger(Some(linger)))
    }

    fn non_negative_secs(&self, key: &str, default: i64) -> Result<Duration, ConfigError> {
        let secs = self.lookup::<i64>(key, &[])?.unwrap_or(default);
        u64::try_from(secs)
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::invalid(key, format!("{} must not be negative", secs)))
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    /// Configured locks in file order; none configured means every request is rejected
    pub fn lock_definitions(&self) -> Result<Vec<LockDefinition>, ConfigError> {
        Ok(self
            .lookup(LOCKS_PROPERTY, LEGACY_LOCKS_KEYS)?
            .unwrap_or_default())
    }

    pub fn lock_registry(&self) -> Result<LockRegistry, ConfigError> {
        Ok(LockRegistry::new(&self.lock_definitions()?)?)
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.lookup(LOGGING_DIR_PROPERTY, LEGACY_LOG_PATH_KEYS)
                .ok()
                .flatten(),
            self.config.get_bool(LOGGING_CONSOLE_PROPERTY).unwrap_or(true),
            self.config.get_bool(LOGGING_FILE_PROPERTY).unwrap_or(true),
            self.config
                .get_string(LOGGING_LEVEL_PROPERTY)
                .unwrap_or(DEFAULT_LOGGING_LEVEL.to_string()),
        )
    }
}
