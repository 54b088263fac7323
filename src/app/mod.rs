//! Application core — pure domain logic, zero I/O.
//!
//! The [`service::DispenserController`] composes the actuator bank, the
//! scheduler and the position model. All interaction with hardware
//! happens through **port traits** defined in [`ports`], keeping this
//! layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
