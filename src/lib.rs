//! Dispenser actuation core.
//!
//! Drives the stepper-actuated dispensing wheels through a 74HC595 output
//! chain and reads the home sensors and buttons through a 74HC165 input
//! chain, with a cooperative scheduler so several wheels turn at once on
//! one core. Exposes every module for integration testing; the ESP-IDF
//! specific pieces are behind the `espidf` feature.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod pins;
pub mod position;
pub mod scheduler;
pub mod sensors;

pub use app::service::{DispenserController, WheelStatus};
pub use error::{Error, Result};
