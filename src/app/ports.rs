//! Port traits — the hexagonal boundary between the actuation core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DispenserController (domain)
//! ```
//!
//! The shift-register buses implement [`FrameWriter`] and [`SampleReader`];
//! tests substitute recording doubles. The controller consumes them via
//! generics, so nothing above the driver layer touches a GPIO directly.

use crate::drivers::shift_in::InputSample;
use crate::drivers::shift_out::OutputFrame;
use crate::error::{ActuatorError, SensorError};

// ───────────────────────────────────────────────────────────────
// Output port (domain → coils)
// ───────────────────────────────────────────────────────────────

/// Latches a complete output frame onto the motor driver chain.
///
/// Implementations must make the whole frame visible at once; a
/// half-shifted frame must never reach the parallel outputs.
pub trait FrameWriter {
    fn commit(&mut self, frame: OutputFrame) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Input port (switches → domain)
// ───────────────────────────────────────────────────────────────

/// Takes one fresh snapshot of the parallel inputs. No caching.
pub trait SampleReader {
    fn sample(&mut self) -> Result<InputSample, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Monotonic microsecond clock.
pub trait MonotonicClock {
    fn now_us(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / UI)
// ───────────────────────────────────────────────────────────────

/// The controller emits structured [`DispenserEvent`](super::events::DispenserEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::DispenserEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from loading or validating a [`DispenserConfig`](crate::config::DispenserConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Corrupted => Self::Config("corrupted"),
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
        }
    }
}
