//! Timing and retry parameters for the state machines.

use std::time::Duration;

use zwave_core::SensorWakeup;

/// Timeouts used across the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Bounded MAC retransmission time for one presence probe.
    pub probe_per_candidate: Duration,
    /// Extra time per candidate when probing 250 ms beam nodes.
    pub beam_250ms_extra: Duration,
    /// Extra time per candidate when probing 1000 ms beam nodes.
    pub beam_1000ms_extra: Duration,
    /// Fixed slack added to every range-discovery tier.
    pub range_slack: Duration,
    /// Wait for a range-info reply after requesting it.
    pub range_info_timeout: Duration,
    /// Guard on the probing node when the transport never reports back.
    pub probe_guard: Duration,
    /// Guard on the ID-assignment handshake once a node has been found.
    pub learn_timeout: Duration,
    /// Silence tolerated between frames of an authority replay.
    pub update_timeout: Duration,
    /// First retry interval of the pending-update scan.
    pub pending_base: Duration,
    /// Number of doublings before the pending-update interval stops growing.
    pub pending_max_step: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            probe_per_candidate: Duration::from_millis(100),
            beam_250ms_extra: Duration::from_millis(250),
            beam_1000ms_extra: Duration::from_millis(1000),
            range_slack: Duration::from_millis(2000),
            range_info_timeout: Duration::from_millis(3000),
            probe_guard: Duration::from_millis(2500),
            learn_timeout: Duration::from_secs(60),
            update_timeout: Duration::from_secs(10),
            pending_base: Duration::from_secs(2),
            pending_max_step: 5,
        }
    }
}

impl Timing {
    /// Time budget for probing one candidate with an optional wake-up beam.
    pub fn per_candidate(&self, wakeup: Option<SensorWakeup>) -> Duration {
        match wakeup {
            None => self.probe_per_candidate,
            Some(SensorWakeup::Ms250) => self.probe_per_candidate + self.beam_250ms_extra,
            Some(SensorWakeup::Ms1000) => self.probe_per_candidate + self.beam_1000ms_extra,
        }
    }
}

/// Liveness-probe retry bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retries {
    pub add_probe: u8,
    /// Lower than `add_probe`: a missing acknowledgment is the success signal.
    pub remove_probe: u8,
}

impl Default for Retries {
    fn default() -> Self {
        Self {
            add_probe: 4,
            remove_probe: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlConfig {
    pub timing: Timing,
    pub retries: Retries,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_probes_fewer_times_than_add() {
        let retries = Retries::default();
        assert!(retries.remove_probe < retries.add_probe);
    }

    #[test]
    fn beam_candidates_take_longer() {
        let timing = Timing::default();
        let plain = timing.per_candidate(None);
        let short = timing.per_candidate(Some(SensorWakeup::Ms250));
        let long = timing.per_candidate(Some(SensorWakeup::Ms1000));
        assert!(plain < short && short < long);
    }
}
