//! Open-loop wheel position model.
//!
//! Each wheel carries a cumulative signed step count relative to its home
//! position. The compartment index is derived from it:
//!
//! ```text
//!   compartment = ⌊steps / steps_per_compartment⌋ mod compartments
//! ```
//!
//! With 2048 steps per revolution and 15 compartments the spacing is 136
//! steps; the 8-step remainder per revolution is not tracked. Successful
//! moves snap the step count back onto the compartment grid, so the error
//! cannot accumulate across moves. Calibration resets it to zero.

use serde::{Deserialize, Serialize};

use crate::config::{DispenserConfig, WHEEL_COUNT};
use crate::drivers::stepper::Direction;
use crate::error::MotionError;

/// Last known position of one wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WheelPosition {
    pub compartment: u8,
    /// Signed steps since the home position.
    pub steps: i32,
    /// Homed since boot. Positions restored from a snapshot are not.
    pub calibrated: bool,
}

/// Serializable copy of every wheel's position, for the persistence
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub wheels: [WheelPosition; WHEEL_COUNT],
}

impl PositionSnapshot {
    pub fn encode(&self) -> Option<Vec<u8>> {
        postcard::to_allocvec(self).ok()
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        postcard::from_bytes(bytes).ok()
    }
}

#[derive(Debug, Clone)]
pub struct PositionModel {
    steps_per_compartment: u32,
    compartments: u8,
    wheels: [WheelPosition; WHEEL_COUNT],
}

impl PositionModel {
    pub fn new(steps_per_compartment: u32, compartments: u8) -> Self {
        Self {
            steps_per_compartment: steps_per_compartment.max(1),
            compartments: compartments.max(1),
            wheels: [WheelPosition::default(); WHEEL_COUNT],
        }
    }

    pub fn from_config(config: &DispenserConfig) -> Self {
        Self::new(config.steps_per_compartment(), config.compartments_per_wheel)
    }

    pub fn steps_per_compartment(&self) -> u32 {
        self.steps_per_compartment
    }

    pub fn compartments(&self) -> u8 {
        self.compartments
    }

    /// Signed steps from `current` to `target` without wrapping: the
    /// sign picks the direction, the magnitude the step budget.
    pub fn delta_steps(&self, current: u8, target: u8) -> i32 {
        (i32::from(target) - i32::from(current)).saturating_mul(self.spc())
    }

    /// Compartment for a cumulative step count.
    pub fn compartment_for_steps(&self, steps: i32) -> u8 {
        let index = steps.div_euclid(self.spc());
        // rem_euclid of a positive modulus fits in u8
        index.rem_euclid(i32::from(self.compartments)) as u8
    }

    pub fn check_compartment(&self, compartment: u8) -> Result<(), MotionError> {
        if compartment < self.compartments {
            Ok(())
        } else {
            Err(MotionError::InvalidCompartment(compartment))
        }
    }

    pub fn position(&self, wheel: usize) -> WheelPosition {
        self.wheels[wheel]
    }

    /// Steps past the last compartment boundary.
    pub fn offset_in_compartment(&self, wheel: usize) -> u32 {
        self.wheels[wheel].steps.rem_euclid(self.spc()) as u32
    }

    pub fn is_calibrated(&self, wheel: usize) -> bool {
        self.wheels[wheel].calibrated
    }

    /// The wheel sits on its home sensor.
    pub fn mark_home(&mut self, wheel: usize) {
        self.wheels[wheel] = WheelPosition {
            compartment: 0,
            steps: 0,
            calibrated: true,
        };
    }

    /// Homing failed; the recorded position is no longer trusted.
    pub fn invalidate(&mut self, wheel: usize) {
        self.wheels[wheel].calibrated = false;
    }

    /// Snap onto `compartment` after a completed move.
    pub fn set_compartment(&mut self, wheel: usize, compartment: u8) {
        let c = compartment % self.compartments;
        let steps = i32::from(c).saturating_mul(self.spc());
        let w = &mut self.wheels[wheel];
        w.compartment = c;
        w.steps = steps;
    }

    /// Account for `steps` issued in `direction` by an interrupted motion.
    /// Returns the compartment the wheel is now considered to be at.
    pub fn apply_steps(&mut self, wheel: usize, direction: Direction, steps: u32) -> u8 {
        let delta = i32::try_from(steps).unwrap_or(i32::MAX) * direction.sign();
        let total = self.wheels[wheel].steps.saturating_add(delta);
        let compartment = self.compartment_for_steps(total);
        let w = &mut self.wheels[wheel];
        w.steps = total;
        w.compartment = compartment;
        compartment
    }

    /// Move `passes` compartments forward after a counted rotation.
    pub fn advance_compartments(&mut self, wheel: usize, passes: u8) -> u8 {
        let current = u32::from(self.wheels[wheel].compartment);
        let next = ((current + u32::from(passes)) % u32::from(self.compartments)) as u8;
        self.set_compartment(wheel, next);
        next
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot { wheels: self.wheels }
    }

    /// Adopt a stored position. Every wheel stays uncalibrated until homed.
    pub fn restore(&mut self, snapshot: &PositionSnapshot) {
        let spc = self.spc();
        for (w, stored) in self.wheels.iter_mut().zip(snapshot.wheels.iter()) {
            let compartment = stored.compartment % self.compartments;
            *w = WheelPosition {
                compartment,
                steps: i32::from(compartment).saturating_mul(spc),
                calibrated: false,
            };
        }
    }

    fn spc(&self) -> i32 {
        i32::try_from(self.steps_per_compartment).unwrap_or(i32::MAX)
    }
}
