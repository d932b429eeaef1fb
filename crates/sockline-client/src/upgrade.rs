//! Transport upgrade coordinator.
//!
//! While the primary transport is the polling kind and the peer advertises
//! the persistent kind, a probe transport is opened with the same session id:
//!
//! ```text
//! client --2probe--> probe
//! client <--3probe-- probe
//! client ----5-----> probe   (probe becomes primary, old primary closes)
//! ```
//!
//! Until the handover, inbound data is served only by the primary. Anything
//! but the echo on the probe is ignored, and a probe failure leaves the
//! primary untouched.

use sockline_frame::{OpenInfo, Packet};
use sockline_transport::TransportKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Idle,
    /// Probe transport is being opened.
    Opening,
    /// `2probe` sent, waiting for the echo.
    AwaitingEcho,
}

/// What the engine should do with a frame that arrived on the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Echo received: send the upgrade packet and swap transports.
    Handover,
    Ignore,
}

#[derive(Debug)]
pub struct UpgradeCoordinator {
    state: UpgradeState,
}

impl Default for UpgradeCoordinator {
    fn default() -> Self {
        Self {
            state: UpgradeState::Idle,
        }
    }
}

impl UpgradeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> UpgradeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != UpgradeState::Idle
    }

    /// Decide whether to probe after an open. Moves to `Opening` when it does.
    pub fn start(
        &mut self,
        primary: TransportKind,
        info: &OpenInfo,
        allowed: &[TransportKind],
    ) -> bool {
        let target = TransportKind::WebSocket;
        let eligible = self.state == UpgradeState::Idle
            && !primary.is_persistent()
            && allowed.contains(&target)
            && info.can_upgrade_to(target.as_str());
        if eligible {
            self.state = UpgradeState::Opening;
        }
        eligible
    }

    /// The probe transport opened; returns the probe packet to send on it.
    pub fn probe_opened(&mut self) -> Option<Packet> {
        if self.state != UpgradeState::Opening {
            return None;
        }
        self.state = UpgradeState::AwaitingEcho;
        Some(Packet::probe())
    }

    pub fn probe_frame(&mut self, packet: &Packet) -> ProbeOutcome {
        if self.state == UpgradeState::AwaitingEcho && packet.is_probe_echo() {
            self.state = UpgradeState::Idle;
            ProbeOutcome::Handover
        } else {
            ProbeOutcome::Ignore
        }
    }

    /// The probe closed or failed to open.
    pub fn probe_failed(&mut self) {
        self.state = UpgradeState::Idle;
    }

    pub fn reset(&mut self) {
        self.state = UpgradeState::Idle;
    }
}
