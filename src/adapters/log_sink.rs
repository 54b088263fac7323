//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing controller events to the logger
//! (UART / USB-CDC in production, stderr on the host). A display or
//! network adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::DispenserEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`DispenserEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &DispenserEvent) {
        match event {
            DispenserEvent::MotionStarted { wheel } => {
                info!("MOTION | wheel={} started", wheel);
            }
            DispenserEvent::Calibrated { wheel } => {
                info!("HOME | wheel={} calibrated, compartment=0", wheel);
            }
            DispenserEvent::CalibrationFailed { wheel, error } => {
                warn!("HOME | wheel={} failed: {}", wheel, error);
            }
            DispenserEvent::MoveCompleted { wheel, compartment } => {
                info!("MOVE | wheel={} at compartment={}", wheel, compartment);
            }
            DispenserEvent::MoveAborted { wheel, compartment } => {
                warn!("MOVE | wheel={} incomplete, stopped at compartment={}", wheel, compartment);
            }
            DispenserEvent::MoveCancelled { wheel, compartment } => {
                warn!("MOVE | wheel={} cancelled near compartment={}", wheel, compartment);
            }
            DispenserEvent::MoveTimedOut { wheel, compartment } => {
                warn!("MOVE | wheel={} sensor passes missing, near compartment={}", wheel, compartment);
            }
            DispenserEvent::EmergencyStop => {
                warn!("ESTOP | all outputs zeroed");
            }
            DispenserEvent::Button(b) => {
                info!("BUTTON | {} {:?}", b.button, b.gesture);
            }
        }
    }
}
