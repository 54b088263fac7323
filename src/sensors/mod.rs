//! Sensor subsystem — logical views over the shared input sample.
//!
//! Nothing here touches a GPIO. The controller samples the 74HC165 chain
//! once per tick and hands the same [`InputSample`](crate::drivers::shift_in::InputSample)
//! to every home sensor and to the button bank.

pub mod buttons;
pub mod edge;
pub mod limit;
