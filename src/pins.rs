//! GPIO / peripheral pin assignments for the dispenser main board.
//!
//! Single source of truth — the binary wires the shift-register buses from
//! these numbers and the default [`DispenserConfig`](crate::config::DispenserConfig)
//! takes its sensor bit positions from here.

// ---------------------------------------------------------------------------
// Output chain (2 × 74HC595, serial-in / parallel-out)
// ---------------------------------------------------------------------------

/// Serial data into the first 74HC595 (DS).
pub const OUT_DATA_GPIO: i32 = 25;
/// Shift clock (SH_CP). Rising edge shifts DS in.
pub const OUT_CLOCK_GPIO: i32 = 26;
/// Latch clock (ST_CP). Rising edge copies the shift stage to the outputs.
pub const OUT_LATCH_GPIO: i32 = 27;

// ---------------------------------------------------------------------------
// Input chain (1 × 74HC165, parallel-in / serial-out)
// ---------------------------------------------------------------------------

/// Parallel load (SH/LD), active low.
pub const IN_LOAD_GPIO: i32 = 14;
/// Shift clock (CLK).
pub const IN_CLOCK_GPIO: i32 = 12;
/// Serial data out of the last 74HC165 (QH).
pub const IN_DATA_GPIO: i32 = 13;

// ---------------------------------------------------------------------------
// Input sample bit assignments
// ---------------------------------------------------------------------------

/// Bit of the first push-button; buttons occupy bits 0..=3.
pub const BUTTON_BIT_BASE: u8 = 0;
/// Bit of wheel 0's home sensor; wheel sensors occupy bits 4..=7.
pub const WHEEL_SENSOR_BIT_BASE: u8 = 4;
