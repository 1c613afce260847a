//! CLI override definitions and application logic.

use clap::Parser;

use crate::Config;
use crate::types::CongestionKind;

#[derive(Debug, Clone, Parser, Default)]
pub struct CliOverrides {
    /// Override remote server address, e.g. proxy.example:443
    #[arg(short, long)]
    pub server: Option<String>,
    /// Override local SOCKS5 listen address, e.g. 127.0.0.1:1080
    #[arg(short, long)]
    pub listen: Option<String>,
    /// Override display identity
    #[arg(long)]
    pub name: Option<String>,
    /// Override uplink bandwidth (Mbps)
    #[arg(long, allow_hyphen_values = true)]
    pub up_mbps: Option<i64>,
    /// Override downlink bandwidth (Mbps)
    #[arg(long, allow_hyphen_values = true)]
    pub down_mbps: Option<i64>,
    /// Override per-stream receive window (bytes, 0 = default)
    #[arg(long)]
    pub recv_window: Option<u64>,
    /// Override per-connection receive window (bytes, 0 = default)
    #[arg(long)]
    pub recv_window_conn: Option<u64>,
    /// Override custom CA bundle path (PEM)
    #[arg(long)]
    pub ca: Option<String>,
    /// Override TLS SNI hostname
    #[arg(long)]
    pub sni: Option<String>,
    /// Skip TLS certificate verification
    #[arg(long)]
    pub skip_verify: bool,
    /// Override congestion control strategy
    #[arg(long, value_enum)]
    pub congestion: Option<CongestionKind>,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
}

pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) {
    let client = &mut config.client;
    if let Some(v) = &overrides.server {
        client.server = v.clone();
    }
    if let Some(v) = &overrides.listen {
        client.listen = v.clone();
    }
    if let Some(v) = &overrides.name {
        client.name = v.clone();
    }
    if let Some(v) = overrides.up_mbps {
        client.up_mbps = v;
    }
    if let Some(v) = overrides.down_mbps {
        client.down_mbps = v;
    }
    if let Some(v) = overrides.recv_window {
        client.recv_window = v;
    }
    if let Some(v) = overrides.recv_window_conn {
        client.recv_window_conn = v;
    }
    if let Some(v) = &overrides.ca {
        client.ca = Some(v.clone());
    }
    if let Some(v) = &overrides.sni {
        client.sni = Some(v.clone());
    }
    if overrides.skip_verify {
        client.skip_verify = true;
    }
    if let Some(v) = overrides.congestion {
        client.congestion = v;
    }
    if let Some(v) = &overrides.log_level {
        config.logging.level = Some(v.clone());
    }
}
