//! Serial output bus — bit-banged 74HC595 chain driving the stepper coils.
//!
//! Three wires: serial data (DS), shift clock (SH_CP) and latch clock
//! (ST_CP). Bits are presented MSB first and sampled by the chip on the
//! rising shift-clock edge; nothing reaches the parallel outputs until the
//! latch pulse. [`SerialOutputBus::commit`] shifts every byte of the frame
//! and then latches exactly once, so the driver boards never see a torn
//! half-updated frame.
//!
//! ```text
//!   MCU ──DS──▶ [595 #1] ──Q7'──▶ [595 #0] ──▶ channels 0..3
//!        ──SH_CP──┴────────────────┘
//!        ──ST_CP──┴────────────────┘
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, PinState};

use crate::app::ports::FrameWriter;
use crate::error::ActuatorError;

/// Number of cascaded output chips.
pub const OUTPUT_CHIPS: usize = 2;

/// Coil state of all four motor channels, 4 bits per channel.
///
/// Bits `[4i, 4i+3]` hold channel `i`'s coil pattern. Transmitted
/// most-significant byte first, each byte MSB first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputFrame(pub u16);

impl OutputFrame {
    pub const ZERO: Self = Self(0);

    /// Cascade-ordered bytes: the most-significant chip's byte first.
    pub const fn to_bytes(self) -> [u8; OUTPUT_CHIPS] {
        self.0.to_be_bytes()
    }

    /// The 4-bit slot of `channel`.
    pub const fn nibble(self, channel: usize) -> u8 {
        ((self.0 >> (channel * 4)) & 0x0F) as u8
    }

    /// Copy with `channel`'s slot replaced by the low 4 bits of `pattern`.
    pub const fn with_nibble(self, channel: usize, pattern: u8) -> Self {
        let shift = channel * 4;
        let cleared = self.0 & !(0x0Fu16 << shift);
        Self(cleared | (((pattern & 0x0F) as u16) << shift))
    }
}

/// Bit-banged driver for the 74HC595 chain.
pub struct SerialOutputBus<D, C, L, T> {
    data: D,
    clock: C,
    latch: L,
    delay: T,
    pulse_us: u32,
}

impl<D, C, L, T> SerialOutputBus<D, C, L, T>
where
    D: OutputPin,
    C: OutputPin,
    L: OutputPin,
    T: DelayNs,
{
    /// Take ownership of the three pins and park both clocks low.
    pub fn new(
        data: D,
        clock: C,
        latch: L,
        delay: T,
        pulse_us: u32,
    ) -> Result<Self, ActuatorError> {
        let mut bus = Self {
            data,
            clock,
            latch,
            delay,
            pulse_us,
        };
        drive(&mut bus.clock, false)?;
        drive(&mut bus.latch, false)?;
        Ok(bus)
    }

    /// Clock one byte into the chain, MSB first, without latching.
    pub fn shift_byte(&mut self, byte: u8) -> Result<(), ActuatorError> {
        for bit in (0..8).rev() {
            drive(&mut self.data, (byte >> bit) & 1 == 1)?;
            self.delay.delay_us(self.pulse_us);
            drive(&mut self.clock, true)?;
            self.delay.delay_us(self.pulse_us);
            drive(&mut self.clock, false)?;
        }
        Ok(())
    }

    /// Copy the shift stage of every chip to its parallel outputs.
    pub fn latch(&mut self) -> Result<(), ActuatorError> {
        drive(&mut self.latch, true)?;
        self.delay.delay_us(self.pulse_us);
        drive(&mut self.latch, false)
    }

    /// Shift a single byte and latch it.
    pub fn shift_out(&mut self, byte: u8) -> Result<(), ActuatorError> {
        self.shift_byte(byte)?;
        self.latch()
    }

    /// Shift every byte in cascade order, then latch once.
    pub fn commit_bytes(&mut self, bytes: &[u8]) -> Result<(), ActuatorError> {
        for &byte in bytes {
            self.shift_byte(byte)?;
        }
        self.latch()
    }
}

impl<D, C, L, T> FrameWriter for SerialOutputBus<D, C, L, T>
where
    D: OutputPin,
    C: OutputPin,
    L: OutputPin,
    T: DelayNs,
{
    fn commit(&mut self, frame: OutputFrame) -> Result<(), ActuatorError> {
        self.commit_bytes(&frame.to_bytes())
    }
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), ActuatorError> {
    pin.set_state(PinState::from(high))
        .map_err(|_| ActuatorError::GpioWriteFailed)
}
