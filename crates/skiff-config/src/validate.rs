//! Validation and resolution of client settings.
//!
//! `resolve` turns raw [`ClientSettings`] into a [`ResolvedClient`] in which
//! every numeric field is non-zero and the identity has been filled in when
//! the OS can provide one.

use std::path::PathBuf;

use skiff_core::defaults::{DEFAULT_CONN_RECEIVE_WINDOW, DEFAULT_STREAM_RECEIVE_WINDOW};
use tracing::debug;

use crate::error::ConfigError;
use crate::types::{ClientSettings, CongestionKind};

const MIN_RELAY_BUFFER: usize = 1024;
const MAX_RELAY_BUFFER: usize = 1024 * 1024;

/// Client settings after validation and defaulting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClient {
    pub server: String,
    pub listen: String,
    /// May be empty when no name was configured and the OS lookup failed.
    pub name: String,
    pub up_mbps: u64,
    pub down_mbps: u64,
    pub recv_window: u64,
    pub recv_window_conn: u64,
    pub ca: Option<PathBuf>,
    pub sni: Option<String>,
    pub skip_verify: bool,
    pub auth: Vec<u8>,
    pub congestion: CongestionKind,
    pub tcp_no_delay: bool,
    pub relay_buffer_size: usize,
}

/// Check the fields that have no default.
pub fn validate_settings(settings: &ClientSettings) -> Result<(), ConfigError> {
    validate_host_port("client.server", &settings.server)?;
    validate_host_port("client.listen", &settings.listen)?;
    if settings.up_mbps <= 0 {
        return Err(ConfigError::Validation(format!(
            "client.up_mbps must be > 0 (got {})",
            settings.up_mbps
        )));
    }
    if settings.down_mbps <= 0 {
        return Err(ConfigError::Validation(format!(
            "client.down_mbps must be > 0 (got {})",
            settings.down_mbps
        )));
    }
    if !(MIN_RELAY_BUFFER..=MAX_RELAY_BUFFER).contains(&settings.relay_buffer_size) {
        return Err(ConfigError::Validation(format!(
            "client.relay_buffer_size must be {MIN_RELAY_BUFFER}..={MAX_RELAY_BUFFER}"
        )));
    }
    if let Some(ca) = &settings.ca
        && ca.trim().is_empty()
    {
        return Err(ConfigError::Validation("client.ca is empty".into()));
    }
    Ok(())
}

/// Validate and default `settings`, looking the identity up from the OS.
pub fn resolve(settings: &ClientSettings) -> Result<ResolvedClient, ConfigError> {
    resolve_with(settings, os_identity)
}

/// Like [`resolve`] but with an injectable identity source.
///
/// The source is only consulted when `settings.name` is empty.
pub fn resolve_with<F>(settings: &ClientSettings, identity: F) -> Result<ResolvedClient, ConfigError>
where
    F: FnOnce() -> Option<String>,
{
    validate_settings(settings)?;

    let name = if settings.name.is_empty() {
        identity().unwrap_or_default()
    } else {
        settings.name.clone()
    };

    Ok(ResolvedClient {
        server: settings.server.clone(),
        listen: settings.listen.clone(),
        name,
        up_mbps: settings.up_mbps.unsigned_abs(),
        down_mbps: settings.down_mbps.unsigned_abs(),
        recv_window: non_zero_or(settings.recv_window, DEFAULT_STREAM_RECEIVE_WINDOW),
        recv_window_conn: non_zero_or(settings.recv_window_conn, DEFAULT_CONN_RECEIVE_WINDOW),
        ca: settings.ca.as_ref().map(PathBuf::from),
        sni: settings.sni.clone(),
        skip_verify: settings.skip_verify,
        auth: settings
            .auth
            .as_deref()
            .map(|a| a.as_bytes().to_vec())
            .unwrap_or_default(),
        congestion: settings.congestion,
        tcp_no_delay: settings.tcp_no_delay,
        relay_buffer_size: settings.relay_buffer_size,
    })
}

/// Best-effort display name of the current OS account.
///
/// Prefers the full name and falls back to the login name.
pub fn os_identity() -> Option<String> {
    let non_empty = |s: String| {
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };
    match whoami::fallible::realname().ok().and_then(non_empty) {
        Some(name) => Some(name),
        None => {
            let username = whoami::fallible::username().ok().and_then(non_empty);
            if username.is_none() {
                debug!("could not determine OS account name");
            }
            username
        }
    }
}

fn non_zero_or(value: u64, default: u64) -> u64 {
    if value == 0 { default } else { value }
}

/// Accepts `host:port` and `[v6]:port`; the port must be a u16.
fn validate_host_port(field: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} is empty")));
    }
    let invalid = || ConfigError::Validation(format!("{field} is not a valid host:port ({value})"));

    let (host, port) = if let Some(rest) = value.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = tail.strip_prefix(':').ok_or_else(invalid)?;
        if host.parse::<std::net::Ipv6Addr>().is_err() {
            return Err(invalid());
        }
        (host, port)
    } else {
        let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
        if host.contains(':') {
            return Err(invalid());
        }
        (host, port)
    };

    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }
    Ok(())
}
