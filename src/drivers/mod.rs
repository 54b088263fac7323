//! Shift-register buses, the stepper sequence and the actuator bank.

pub mod actuator_bank;
pub mod shift_in;
pub mod shift_out;
pub mod stepper;
