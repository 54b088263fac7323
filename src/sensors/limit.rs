//! Home / limit sensors read from the shared input sample.
//!
//! Each wheel has an opto or micro-switch on one bit of the 74HC165 chain.
//! The lines are pulled up, so a `0` means the sensor is asserted.

use crate::drivers::shift_in::InputSample;

/// Logical view of one bit of the input sample. Stateless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSensor {
    bit: u8,
}

impl LimitSensor {
    pub const fn new(bit: u8) -> Self {
        Self { bit }
    }

    pub const fn bit(self) -> u8 {
        self.bit
    }

    /// Active-low: asserted when the sensor's bit reads `0`.
    pub const fn is_asserted(self, sample: InputSample) -> bool {
        (sample.0 >> self.bit) & 1 == 0
    }
}
