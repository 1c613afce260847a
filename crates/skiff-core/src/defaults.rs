//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Flow Control Defaults
// ============================================================================

/// Default per-stream receive window ceiling (32 MiB).
pub const DEFAULT_STREAM_RECEIVE_WINDOW: u64 = 32 * 1024 * 1024;
/// Default per-connection receive window ceiling (64 MiB).
pub const DEFAULT_CONN_RECEIVE_WINDOW: u64 = 64 * 1024 * 1024;

// ============================================================================
// Bandwidth
// ============================================================================

/// Bytes per second in one megabit per second.
pub const MBPS_TO_BPS: u64 = 125_000;

// ============================================================================
// Session Defaults
// ============================================================================

/// ALPN tag that distinguishes a tunnel handshake from generic QUIC traffic.
pub const DEFAULT_ALPN: &str = "skiff-proxy";
/// Default keep-alive interval in seconds.
pub const DEFAULT_KEEP_ALIVE_INTERVAL_SECS: u64 = 10;
/// Default idle timeout of the QUIC session in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;
/// Default upper bound for establishing the session (QUIC + hello).
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Relay Defaults
// ============================================================================

/// Default relay buffer size (32 KiB).
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 32768;
/// Default TCP_NODELAY on accepted local connections.
pub const DEFAULT_TCP_NO_DELAY: bool = true;
/// How long shutdown waits for in-flight relays to report their close.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Protocol Constants
// ============================================================================

/// Maximum bytes a hello or stream response may occupy.
pub const MAX_CONTROL_FRAME_BYTES: usize = 4096;
