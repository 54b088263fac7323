//! Unified error types for the dispenser control core.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! façade's error handling uniform. All variants are `Copy` so they can be
//! handed back to the UI layer without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the actuation layer funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The input shift-register chain could not be read.
    Sensor(SensorError),
    /// The output shift-register chain could not be written.
    Actuator(ActuatorError),
    /// A motion request was rejected or did not complete.
    Motion(MotionError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Motion(e) => write!(f, "motion: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Serial-data pin read returned an error.
    GpioReadFailed,
    /// Load or clock pin could not be driven while sampling.
    GpioWriteFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioReadFailed => write!(f, "GPIO read failed"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed during sample"),
        }
    }
}

impl std::error::Error for SensorError {}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Data, clock or latch pin could not be driven.
    GpioWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
        }
    }
}

impl std::error::Error for ActuatorError {}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Motion errors
// ---------------------------------------------------------------------------

/// Outcomes the façade reports instead of silently swallowing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionError {
    /// Calibration never saw the home sensor within its step/time budget.
    HardwareTimeout { wheel: u8 },
    /// A move stopped early because the sensor fired mid-travel.
    Aborted { wheel: u8, compartment: u8 },
    /// Wheel id outside the configured wheels.
    InvalidWheel(u8),
    /// Compartment index outside `0..compartments_per_wheel`.
    InvalidCompartment(u8),
    /// A motion is already in progress on this wheel.
    WheelBusy(u8),
    /// An emergency stop cancelled the motion.
    Cancelled { wheel: u8 },
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardwareTimeout { wheel } => {
                write!(f, "wheel {wheel}: home sensor not reached (timeout)")
            }
            Self::Aborted { wheel, compartment } => {
                write!(f, "wheel {wheel}: incomplete, stopped at compartment {compartment}")
            }
            Self::InvalidWheel(w) => write!(f, "invalid wheel id {w}"),
            Self::InvalidCompartment(c) => write!(f, "invalid compartment {c}"),
            Self::WheelBusy(w) => write!(f, "wheel {w} is already moving"),
            Self::Cancelled { wheel } => write!(f, "wheel {wheel}: motion cancelled"),
        }
    }
}

impl std::error::Error for MotionError {}

impl From<MotionError> for Error {
    fn from(e: MotionError) -> Self {
        Self::Motion(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
