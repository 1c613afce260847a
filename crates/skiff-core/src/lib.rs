//! Core types and constants shared across skiff crates.
//!
//! This crate provides:
//! - Default configuration values
//! - Error type constants for logging
//! - The bidirectional relay used by the SOCKS5 front-end

pub mod defaults;
pub mod errors;
pub mod io;

pub use defaults::*;
pub use errors::*;

/// Project name.
pub const PROJECT_NAME: &str = "skiff";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
