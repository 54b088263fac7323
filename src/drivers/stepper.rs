//! Stepper commutation sequence for the unipolar wheel motors.
//!
//! Eight entries, alternating one and two energised coils:
//!
//! | index | coils | pattern (D C B A) |
//! |-------|-------|-------------------|
//! | 0     | A     | `0001`            |
//! | 1     | AB    | `0011`            |
//! | 2     | B     | `0010`            |
//! | 3     | BC    | `0110`            |
//! | 4     | C     | `0100`            |
//! | 5     | CD    | `1100`            |
//! | 6     | D     | `1000`            |
//! | 7     | DA    | `1001`            |
//!
//! Advancing the index by +1 (mod 8) is one micro-step forward, −1 is one
//! micro-step back.

/// Length of the commutation cycle.
pub const SEQUENCE_LEN: u8 = 8;

const SEQUENCE: [u8; SEQUENCE_LEN as usize] = [
    0b0001, 0b0011, 0b0010, 0b0110, 0b0100, 0b1100, 0b1000, 0b1001,
];

/// Rotation direction of a wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// +1 or −1.
    pub const fn sign(self) -> i32 {
        match self {
            Self::Forward => 1,
            Self::Reverse => -1,
        }
    }

    /// Direction that moves a signed step delta toward zero remaining.
    pub const fn of_delta(delta: i32) -> Self {
        if delta < 0 { Self::Reverse } else { Self::Forward }
    }
}

/// Position within the commutation cycle (always `0..8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepIndex(u8);

impl StepIndex {
    pub const fn new(index: u8) -> Self {
        Self(index % SEQUENCE_LEN)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// One micro-step in `direction`, wrapping mod 8.
    pub const fn advance(self, direction: Direction) -> Self {
        match direction {
            Direction::Forward => Self((self.0 + 1) % SEQUENCE_LEN),
            Direction::Reverse => Self((self.0 + SEQUENCE_LEN - 1) % SEQUENCE_LEN),
        }
    }

    /// Coil pattern to energise at this index.
    pub const fn pattern(self) -> u8 {
        pattern_for(self.0)
    }
}

/// 4-bit coil pattern for `step_index` (taken mod 8).
pub const fn pattern_for(step_index: u8) -> u8 {
    SEQUENCE[(step_index % SEQUENCE_LEN) as usize]
}
