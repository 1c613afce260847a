//! QUIC transport parameters derived from the resolved configuration.

use std::sync::Arc;
use std::time::Duration;

use quinn::{IdleTimeout, TransportConfig, VarInt};
use skiff_config::ResolvedClient;
use skiff_core::defaults::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_KEEP_ALIVE_INTERVAL_SECS, MBPS_TO_BPS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportParameters {
    /// Per-stream receive window, bytes.
    pub stream_receive_window: u64,
    /// Per-connection receive window, bytes.
    pub receive_window: u64,
    pub keep_alive: bool,
    pub keep_alive_interval: Duration,
    pub idle_timeout: Duration,
    /// Uplink hint, bytes/second.
    pub up_bps: u64,
    /// Downlink hint, bytes/second.
    pub down_bps: u64,
}

impl TransportParameters {
    pub fn from_resolved(config: &ResolvedClient) -> Self {
        Self {
            stream_receive_window: config.recv_window,
            receive_window: config.recv_window_conn,
            keep_alive: true,
            keep_alive_interval: Duration::from_secs(DEFAULT_KEEP_ALIVE_INTERVAL_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            up_bps: config.up_mbps.saturating_mul(MBPS_TO_BPS),
            down_bps: config.down_mbps.saturating_mul(MBPS_TO_BPS),
        }
    }

    /// Render into a quinn transport config driven by `controller`.
    ///
    /// Windows beyond the QUIC varint range are clamped.
    pub fn to_transport_config(
        &self,
        controller: Arc<dyn quinn::congestion::ControllerFactory + Send + Sync>,
    ) -> TransportConfig {
        let mut transport = TransportConfig::default();
        transport
            .stream_receive_window(varint_clamped(self.stream_receive_window))
            .receive_window(varint_clamped(self.receive_window))
            .keep_alive_interval(self.keep_alive.then_some(self.keep_alive_interval))
            .max_idle_timeout(IdleTimeout::try_from(self.idle_timeout).ok())
            .congestion_controller_factory(controller);
        transport
    }
}

fn varint_clamped(value: u64) -> VarInt {
    VarInt::from_u64(value).unwrap_or(VarInt::MAX)
}

#[cfg(test)]
mod tests {
    use skiff_config::CongestionKind;

    use super::*;

    fn resolved() -> ResolvedClient {
        ResolvedClient {
            server: "proxy.example:443".into(),
            listen: "127.0.0.1:1080".into(),
            name: String::new(),
            up_mbps: 10,
            down_mbps: 50,
            recv_window: 15_728_640,
            recv_window_conn: 67_108_864,
            ca: None,
            sni: None,
            skip_verify: false,
            auth: Vec::new(),
            congestion: CongestionKind::Brutal,
            tcp_no_delay: true,
            relay_buffer_size: 32 * 1024,
        }
    }

    #[test]
    fn bandwidth_is_scaled_to_bytes_per_second() {
        let params = TransportParameters::from_resolved(&resolved());
        assert_eq!(params.up_bps, 1_250_000);
        assert_eq!(params.down_bps, 6_250_000);
    }

    #[test]
    fn windows_are_copied_and_keep_alive_is_on() {
        let params = TransportParameters::from_resolved(&resolved());
        assert_eq!(params.stream_receive_window, 15_728_640);
        assert_eq!(params.receive_window, 67_108_864);
        assert!(params.keep_alive);
        assert!(params.keep_alive_interval < params.idle_timeout);
    }

    #[test]
    fn oversized_window_is_clamped() {
        assert_eq!(varint_clamped(u64::MAX), VarInt::MAX);
        assert_eq!(varint_clamped(1024), VarInt::from_u32(1024));
    }

    #[test]
    fn renders_transport_config() {
        let params = TransportParameters::from_resolved(&resolved());
        let _ = params.to_transport_config(Arc::new(quinn::congestion::CubicConfig::default()));
    }
}
