//! Configuration loading, validation, resolution and CLI overrides.

mod cli;
mod defaults;
mod error;
mod loader;
mod types;
mod validate;

pub use cli::{CliOverrides, apply_overrides};
pub use error::ConfigError;
pub use loader::load_config;
pub use types::*;
pub use validate::{ResolvedClient, os_identity, resolve, resolve_with, validate_settings};
