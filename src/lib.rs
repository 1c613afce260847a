//! # skiff
//!
//! A QUIC tunnel client that exposes a local SOCKS5 relay.
//!
//! ## Crates
//!
//! - [`skiff_core`] - Defaults, error classes and the byte relay
//! - [`skiff_proto`] - Tunnel framing
//! - [`skiff_config`] - Configuration loading, validation and resolution
//! - [`skiff_client`] - Session orchestration and the SOCKS5 front-end

pub use skiff_client as client;
pub use skiff_config as config;
pub use skiff_core as core;
pub use skiff_proto as proto;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use skiff_client::{
        ClientError, LogObserver, RelayObserver, Session, run, run_resolved,
    };
    pub use skiff_config::{Config, ResolvedClient, load_config, resolve};
    pub use tokio_util::sync::CancellationToken;
}
