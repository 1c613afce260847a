//! Relay lifecycle notifications.

use std::net::SocketAddr;

use tracing::{debug, info};

use crate::error::RelayError;

/// Receives one `on_open` and exactly one matching `on_close` per relayed
/// connection. Connections that fail SOCKS5 negotiation produce neither.
///
/// Calls come from many relay tasks concurrently.
pub trait RelayObserver: Send + Sync {
    fn on_open(&self, local: SocketAddr, target: &str);

    /// `cause` is `None` when both sides closed cleanly.
    fn on_close(&self, local: SocketAddr, target: &str, cause: Option<&RelayError>);
}

/// Writes relay events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl RelayObserver for LogObserver {
    fn on_open(&self, local: SocketAddr, target: &str) {
        info!(local = %local, target = %target, "[TCP] relay opened");
    }

    fn on_close(&self, local: SocketAddr, target: &str, cause: Option<&RelayError>) {
        match cause {
            Some(e) => info!(
                local = %local,
                target = %target,
                error = %e,
                error_type = e.error_type(),
                "[TCP] relay closed"
            ),
            None => debug!(local = %local, target = %target, "[TCP] relay closed"),
        }
    }
}
