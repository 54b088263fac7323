//! Inbound commands to the dispenser controller.
//!
//! These represent actions requested by the outside world (scheduler,
//! serial console, buttons) that the
//! [`DispenserController`](super::service::DispenserController) interprets
//! and acts upon. Wheel and compartment ids are validated on receipt.

use serde::{Deserialize, Serialize};

/// Commands that external adapters can send into the actuation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispenserCommand {
    /// Home the wheel on its sensor (non-blocking).
    Calibrate { wheel: u8 },

    /// Drive to an absolute compartment index.
    MoveTo { wheel: u8, compartment: u8 },

    /// Rotate forward until `compartments` sensor notches have passed.
    RotateBy { wheel: u8, compartments: u8 },

    /// Loading rotation (configured number of passes).
    Load { wheel: u8 },

    /// Stop every motor and de-energise all coils.
    EmergencyStop,
}
