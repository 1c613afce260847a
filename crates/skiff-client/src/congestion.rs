//! Congestion-control strategies selectable per session.
//!
//! A [`ControllerFactory`] turns the configured uplink rate into a quinn
//! controller factory. The orchestrator calls it once per connect and does
//! not care which strategy it gets back.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use quinn::congestion::{
    BbrConfig, Controller, ControllerFactory as QuicControllerFactory, CubicConfig, NewRenoConfig,
};
use quinn_proto::RttEstimator;
use skiff_config::CongestionKind;

/// quinn controller factory handed to the transport config.
pub type SharedController = Arc<dyn QuicControllerFactory + Send + Sync>;

/// Produces a congestion controller for a reference bitrate in bytes/second.
pub trait ControllerFactory: Send + Sync {
    fn make_controller(&self, reference_bps: u64) -> SharedController;
}

impl<F> ControllerFactory for F
where
    F: Fn(u64) -> SharedController + Send + Sync,
{
    fn make_controller(&self, reference_bps: u64) -> SharedController {
        self(reference_bps)
    }
}

/// Map the configured strategy to a factory.
pub fn for_kind(kind: CongestionKind) -> Box<dyn ControllerFactory> {
    match kind {
        CongestionKind::Brutal => Box::new(BrutalFactory),
        CongestionKind::Cubic => {
            Box::new(|_: u64| Arc::new(CubicConfig::default()) as SharedController)
        }
        CongestionKind::Bbr => {
            Box::new(|_: u64| Arc::new(BbrConfig::default()) as SharedController)
        }
        CongestionKind::NewReno => {
            Box::new(|_: u64| Arc::new(NewRenoConfig::default()) as SharedController)
        }
    }
}

/// Fixed-rate strategy: holds the sender at the reference rate regardless
/// of loss, compensating only for the observed ack ratio.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrutalFactory;

impl ControllerFactory for BrutalFactory {
    fn make_controller(&self, reference_bps: u64) -> SharedController {
        Arc::new(BrutalConfig::new(reference_bps))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BrutalConfig {
    bps: u64,
}

impl BrutalConfig {
    pub fn new(bps: u64) -> Self {
        Self { bps }
    }
}

impl QuicControllerFactory for BrutalConfig {
    fn build(self: Arc<Self>, now: Instant, current_mtu: u16) -> Box<dyn Controller> {
        Box::new(Brutal::new(self.bps, now, current_mtu))
    }
}

const SLOT_COUNT: u64 = 5;
const MIN_SAMPLE_COUNT: u64 = 50;
const MIN_ACK_RATE: f64 = 0.8;
const CWND_MULTIPLIER: f64 = 2.0;
const INITIAL_RTT: Duration = Duration::from_millis(333);
const MIN_WINDOW_PACKETS: u64 = 2;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    second: u64,
    acked: u64,
    lost: u64,
}

/// Window = rate × RTT × 2 / ack_rate, where ack_rate is taken over the last
/// five one-second slots and never drops below 0.8.
#[derive(Debug, Clone)]
pub struct Brutal {
    bps: u64,
    mtu: u16,
    rtt: Duration,
    epoch: Instant,
    slots: [Slot; SLOT_COUNT as usize],
    ack_rate: f64,
}

impl Brutal {
    pub fn new(bps: u64, now: Instant, mtu: u16) -> Self {
        Self {
            bps,
            mtu,
            rtt: INITIAL_RTT,
            epoch: now,
            slots: [Slot::default(); SLOT_COUNT as usize],
            ack_rate: 1.0,
        }
    }

    fn second(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_secs()
    }

    fn slot_mut(&mut self, now: Instant) -> &mut Slot {
        let second = self.second(now);
        let slot = &mut self.slots[(second % SLOT_COUNT) as usize];
        if slot.second != second {
            *slot = Slot {
                second,
                ..Slot::default()
            };
        }
        slot
    }

    fn refresh_ack_rate(&mut self, now: Instant) {
        let current = self.second(now);
        let (acked, lost) = self
            .slots
            .iter()
            .filter(|slot| current.saturating_sub(slot.second) < SLOT_COUNT)
            .fold((0, 0), |(a, l), slot| (a + slot.acked, l + slot.lost));
        let total = acked + lost;
        self.ack_rate = if total < MIN_SAMPLE_COUNT {
            1.0
        } else {
            (acked as f64 / total as f64).max(MIN_ACK_RATE)
        };
    }

    fn record_ack(&mut self, now: Instant, rtt: Duration) {
        if !rtt.is_zero() {
            self.rtt = rtt;
        }
        self.slot_mut(now).acked += 1;
        self.refresh_ack_rate(now);
    }

    fn record_loss(&mut self, now: Instant, lost_bytes: u64) {
        let packets = lost_bytes.div_ceil(u64::from(self.mtu)).max(1);
        self.slot_mut(now).lost += packets;
        self.refresh_ack_rate(now);
    }

    fn min_window(&self) -> u64 {
        u64::from(self.mtu) * MIN_WINDOW_PACKETS
    }
}

impl Controller for Brutal {
    fn on_ack(
        &mut self,
        now: Instant,
        _sent: Instant,
        _bytes: u64,
        _app_limited: bool,
        rtt: &RttEstimator,
    ) {
        self.record_ack(now, rtt.get());
    }

    fn on_congestion_event(
        &mut self,
        now: Instant,
        _sent: Instant,
        _is_persistent_congestion: bool,
        lost_bytes: u64,
    ) {
        self.record_loss(now, lost_bytes);
    }

    fn on_mtu_update(&mut self, new_mtu: u16) {
        self.mtu = new_mtu;
    }

    fn window(&self) -> u64 {
        let window = self.bps as f64 * self.rtt.as_secs_f64() * CWND_MULTIPLIER / self.ack_rate;
        (window as u64).max(self.min_window())
    }

    fn clone_box(&self) -> Box<dyn Controller> {
        Box::new(self.clone())
    }

    fn initial_window(&self) -> u64 {
        self.window()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
