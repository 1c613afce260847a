//! Configuration file loading.

use std::fs;
use std::path::Path;

use crate::Config;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    /// JSON, with `//` and `/* */` comments allowed.
    Json,
    Yaml,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" | "jsonc" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Load a configuration file; the format is chosen by extension.
///
/// Only parsing happens here. Field checks belong to
/// [`crate::validate_settings`] and [`crate::resolve`].
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let format =
        Format::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let path = path.to_path_buf();
    match format {
        Format::Json => {
            serde_json::from_reader(json_comments::StripComments::new(data.as_bytes()))
                .map_err(|source| ConfigError::Json { path, source })
        }
        Format::Yaml => {
            serde_yaml::from_str(&data).map_err(|source| ConfigError::Yaml { path, source })
        }
        Format::Toml => toml::from_str(&data).map_err(|source| ConfigError::Toml { path, source }),
    }
}
