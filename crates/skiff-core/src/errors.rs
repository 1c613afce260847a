//! Error type constants for logging.
//!
//! These constants provide consistent error classification across all crates.

/// Configuration error.
pub const ERROR_CONFIG: &str = "config";
/// Trust anchor loading error.
pub const ERROR_TRUST: &str = "trust";
/// Session establishment error.
pub const ERROR_CONNECT: &str = "connect";
/// Local listener bind error.
pub const ERROR_BIND: &str = "bind";
/// SOCKS5 negotiation error.
pub const ERROR_NEGOTIATION: &str = "negotiation";
/// Tunnel stream error.
pub const ERROR_STREAM: &str = "stream";
/// Protocol parsing/validation error.
pub const ERROR_PROTOCOL: &str = "protocol";
/// I/O error.
pub const ERROR_IO: &str = "io";
/// Remote refused the request.
pub const ERROR_REJECTED: &str = "rejected";
/// Timeout error.
pub const ERROR_TIMEOUT: &str = "timeout";
