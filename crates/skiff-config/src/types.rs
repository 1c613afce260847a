//! Configuration type definitions for the client and logging.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::defaults::*;

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub client: ClientSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Operator-supplied client settings, exactly as read from file and flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Remote tunnel endpoint, e.g. "proxy.example:443".
    pub server: String,
    /// Local SOCKS5 listen address, e.g. "127.0.0.1:1080".
    pub listen: String,
    /// Display identity sent to the server. Empty = OS account name.
    #[serde(default)]
    pub name: String,
    /// Uplink bandwidth hint in Mbps.
    pub up_mbps: i64,
    /// Downlink bandwidth hint in Mbps.
    pub down_mbps: i64,
    /// Per-stream receive window in bytes (0 = default).
    #[serde(default)]
    pub recv_window: u64,
    /// Per-connection receive window in bytes (0 = default).
    #[serde(default)]
    pub recv_window_conn: u64,
    /// Custom CA bundle (PEM). When set it replaces the default roots.
    #[serde(default)]
    pub ca: Option<String>,
    /// TLS SNI hostname. Defaults to the host portion of `server`.
    #[serde(default)]
    pub sni: Option<String>,
    /// Skip certificate verification (for testing only).
    #[serde(default)]
    pub skip_verify: bool,
    /// Opaque authentication payload carried in the session hello.
    #[serde(default)]
    pub auth: Option<String>,
    /// Congestion control strategy.
    #[serde(default)]
    pub congestion: CongestionKind,
    /// TCP_NODELAY on accepted SOCKS5 connections.
    #[serde(default = "default_tcp_no_delay")]
    pub tcp_no_delay: bool,
    /// Relay buffer size per direction (bytes).
    #[serde(default = "default_relay_buffer_size")]
    pub relay_buffer_size: usize,
}

/// Congestion control algorithm used for the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CongestionKind {
    /// Fixed-rate sender driven by the uplink bandwidth hint.
    #[default]
    Brutal,
    Cubic,
    Bbr,
    NewReno,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: Option<String>,
    /// Log format: json, pretty, or compact. Default: pretty.
    pub format: Option<String>,
    /// Output target: stdout or stderr. Default: stderr.
    pub output: Option<String>,
    /// Per-module log level filters (e.g., {"skiff_client": "debug", "quinn": "warn"}).
    #[serde(default)]
    pub filters: HashMap<String, String>,
}
