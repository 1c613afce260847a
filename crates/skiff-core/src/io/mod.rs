//! I/O utilities for bidirectional relay.

mod relay;

pub use relay::{RelayStats, relay_bidirectional};
