//! Errors produced while loading, validating or resolving configuration.

use std::io;
use std::path::PathBuf;

use skiff_core::errors::ERROR_CONFIG;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unsupported config format: {} (expected .toml, .json, .jsonc, .yaml or .yml)", .0.display())]
    UnsupportedFormat(PathBuf),
    /// A field failed validation; the message names the field.
    #[error("validation: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn error_type(&self) -> &'static str {
        ERROR_CONFIG
    }

    /// Whether the file itself could not be used, as opposed to its contents
    /// failing validation.
    pub fn is_load_error(&self) -> bool {
        !matches!(self, ConfigError::Validation(_))
    }
}
