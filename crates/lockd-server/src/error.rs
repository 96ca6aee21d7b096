//! Error types for server start-up

use lockd_core::RegistryError;

/// Errors raised while loading or validating the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },

    #[error("invalid lock definitions: {0}")]
    Registry(#[from] RegistryError),
}

impl ConfigError {
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}
