//! Edge detection on the home sensors.
//!
//! Each channel remembers whether its sensor was asserted on the previous
//! observation. Comparing with the current reading yields the transition:
//!
//! - `ReleasedToAsserted` — the sensor just triggered (hard stop, homing).
//! - `AssertedToReleased` — a notch has fully passed (compartment count).
//!
//! State starts as "released", so a sensor that is already asserted when a
//! motion begins reports `ReleasedToAsserted` on the first observation.

use crate::drivers::actuator_bank::{CHANNEL_COUNT, Channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    None,
    AssertedToReleased,
    ReleasedToAsserted,
}

/// Previous reading of one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeState {
    previous_asserted: bool,
}

impl EdgeState {
    /// Compare with the stored reading, then overwrite it.
    pub fn observe(&mut self, currently_asserted: bool) -> EdgeKind {
        let edge = match (self.previous_asserted, currently_asserted) {
            (false, true) => EdgeKind::ReleasedToAsserted,
            (true, false) => EdgeKind::AssertedToReleased,
            _ => EdgeKind::None,
        };
        self.previous_asserted = currently_asserted;
        edge
    }

    pub fn previous_asserted(&self) -> bool {
        self.previous_asserted
    }
}

/// Edge state for every channel, owned by the scheduler.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    states: [EdgeState; CHANNEL_COUNT],
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, channel: Channel, currently_asserted: bool) -> EdgeKind {
        self.states[channel.index()].observe(currently_asserted)
    }

    /// Forget the previous reading (motion start).
    pub fn reset(&mut self, channel: Channel) {
        self.states[channel.index()] = EdgeState::default();
    }
}
