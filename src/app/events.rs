//! Outbound controller events.
//!
//! The [`DispenserController`](super::service::DispenserController) emits
//! these through the [`EventSink`](super::ports::EventSink) port. Adapters
//! on the other side decide what to do with them: log to serial, update a
//! display, notify the dosing scheduler.

use crate::error::MotionError;
use crate::sensors::buttons::ButtonEvent;

/// Structured events emitted by the actuation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenserEvent {
    /// A motion was accepted and the wheel started turning.
    MotionStarted { wheel: u8 },

    /// Homing found the sensor; the wheel is at compartment 0.
    Calibrated { wheel: u8 },

    /// Homing gave up (step or time budget exhausted, or cancelled).
    CalibrationFailed { wheel: u8, error: MotionError },

    /// Positioning or loading rotation reached its target.
    MoveCompleted { wheel: u8, compartment: u8 },

    /// The sensor fired mid-travel; the wheel stopped early.
    MoveAborted { wheel: u8, compartment: u8 },

    /// The motion was stopped from outside.
    MoveCancelled { wheel: u8, compartment: u8 },

    /// Counted rotation never saw enough sensor passes.
    MoveTimedOut { wheel: u8, compartment: u8 },

    /// All outputs were zeroed.
    EmergencyStop,

    /// Debounced front-panel button gesture.
    Button(ButtonEvent),
}
