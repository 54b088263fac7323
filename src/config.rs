//! System configuration parameters
//!
//! All tunable parameters of the actuation core. The external persistence
//! collaborator stores the blob produced by [`DispenserConfig::encode`].

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::drivers::actuator_bank::CHANNEL_COUNT;
use crate::pins;

/// Number of dispensing wheels on the board.
pub const WHEEL_COUNT: usize = 3;

/// Fastest allowed step cadence (100 kHz).
pub const MIN_STEP_INTERVAL_US: u32 = 10;
/// Slowest allowed step cadence (10 Hz).
pub const MAX_STEP_INTERVAL_US: u32 = 100_000;
/// Setup/hold margin of the 74HC165 family around load and clock edges.
pub const MIN_INPUT_SETTLE_US: u32 = 5;

/// How often the output frame is pushed to the 74HC595 chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitMode {
    /// One commit per tick covering every channel that changed.
    PerTick,
    /// One commit per stepped channel. Legacy behaviour, several hardware
    /// writes per tick when motors step together.
    PerChannel,
}

/// Wiring of one wheel: which motor channel drives it and which input bit
/// carries its home sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelConfig {
    pub channel: u8,
    pub sensor_bit: u8,
}

/// Core actuation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispenserConfig {
    // --- Timing ---
    /// Global step cadence shared by every channel (µs per step).
    pub step_interval_us: u32,
    /// Delay around the parallel-load pulse and each input clock edge (µs).
    pub input_settle_us: u32,
    /// Half-period of the output shift and latch clocks (µs).
    pub output_pulse_us: u32,

    // --- Wiring ---
    /// Number of cascaded 74HC165 chips on the input chain.
    pub input_chips: u8,
    pub wheels: [WheelConfig; WHEEL_COUNT],

    // --- Mechanics ---
    /// Motor steps for one full wheel revolution (28BYJ-48: 2048).
    pub steps_per_revolution: u32,
    pub compartments_per_wheel: u8,

    // --- Motion policy ---
    /// Steps a homing pass may take before it is declared a hardware timeout.
    pub homing_step_limit: u32,
    /// Wall-clock bound for blocking calibration (ms).
    pub calibration_timeout_ms: u32,
    /// Abort `move_to` when the wheel's sensor triggers mid-travel.
    pub abort_move_on_sensor: bool,
    /// Distance (steps) from a compartment boundary within which a sensor
    /// trigger is the compartment's own notch, not an obstruction.
    pub notch_window_steps: u32,
    /// Sensor passes a loading rotation waits for.
    pub loading_passes: u8,
    pub commit_mode: CommitMode,
}

impl Default for DispenserConfig {
    fn default() -> Self {
        let wheel = |i: u8| WheelConfig {
            channel: i,
            sensor_bit: pins::WHEEL_SENSOR_BIT_BASE + i,
        };

        Self {
            // Timing
            step_interval_us: 2_000, // 500 Hz
            input_settle_us: MIN_INPUT_SETTLE_US,
            output_pulse_us: 1,

            // Wiring
            input_chips: 1,
            wheels: [wheel(0), wheel(1), wheel(2)],

            // Mechanics
            steps_per_revolution: 2048,
            compartments_per_wheel: 15,

            // Motion policy
            homing_step_limit: 2 * 2048,
            calibration_timeout_ms: 30_000,
            abort_move_on_sensor: true,
            notch_window_steps: 16,
            loading_passes: 3,
            commit_mode: CommitMode::PerTick,
        }
    }
}

impl DispenserConfig {
    /// Steps between two adjacent compartments, fixed by integer division.
    /// The remainder (2048 % 15 = 8) is absorbed as mechanical slack.
    pub const fn steps_per_compartment(&self) -> u32 {
        self.steps_per_revolution / self.compartments_per_wheel as u32
    }

    /// Set the step cadence, clamped to the supported 10 Hz – 100 kHz range.
    pub fn set_step_interval_us(&mut self, interval_us: u32) {
        self.step_interval_us = interval_us.clamp(MIN_STEP_INTERVAL_US, MAX_STEP_INTERVAL_US);
    }

    /// Copy with the step interval clamped into range.
    pub fn clamped(mut self) -> Self {
        self.set_step_interval_us(self.step_interval_us);
        self
    }

    /// Reject values that would drive the hardware outside its limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_STEP_INTERVAL_US..=MAX_STEP_INTERVAL_US).contains(&self.step_interval_us) {
            return Err(ConfigError::ValidationFailed("step_interval_us out of range"));
        }
        if self.input_settle_us < MIN_INPUT_SETTLE_US {
            return Err(ConfigError::ValidationFailed("input_settle_us below 5 µs"));
        }
        if self.input_chips == 0 || self.input_chips > 4 {
            return Err(ConfigError::ValidationFailed("input_chips must be 1..=4"));
        }
        if self.steps_per_revolution > i32::MAX as u32 {
            return Err(ConfigError::ValidationFailed("steps_per_revolution exceeds i32 range"));
        }
        if self.compartments_per_wheel == 0 {
            return Err(ConfigError::ValidationFailed("compartments_per_wheel is zero"));
        }
        if self.steps_per_compartment() == 0 {
            return Err(ConfigError::ValidationFailed(
                "steps_per_revolution smaller than compartment count",
            ));
        }
        if self.notch_window_steps.saturating_mul(2) >= self.steps_per_compartment() {
            return Err(ConfigError::ValidationFailed(
                "notch_window_steps must be under half a compartment",
            ));
        }
        if self.homing_step_limit == 0 {
            return Err(ConfigError::ValidationFailed("homing_step_limit is zero"));
        }
        if self.loading_passes == 0 {
            return Err(ConfigError::ValidationFailed("loading_passes is zero"));
        }

        let input_bits = self.input_chips as u32 * 8;
        for (i, w) in self.wheels.iter().enumerate() {
            if w.channel as usize >= CHANNEL_COUNT {
                return Err(ConfigError::ValidationFailed("wheel channel out of range"));
            }
            if w.sensor_bit as u32 >= input_bits {
                return Err(ConfigError::ValidationFailed("wheel sensor bit outside input chain"));
            }
            if self.wheels[..i].iter().any(|o| o.channel == w.channel) {
                return Err(ConfigError::ValidationFailed("two wheels share a channel"));
            }
        }
        Ok(())
    }

    /// Serialise for the persistence collaborator.
    pub fn encode(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Corrupted)
    }

    /// Deserialise and validate a stored blob.
    pub fn decode(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }
}
