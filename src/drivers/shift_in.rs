//! Serial input bus — bit-banged 74HC165 chain carrying the home sensors
//! and push-buttons.
//!
//! Sampling sequence:
//!
//! 1. Pull SH/LD low → every chip latches its eight parallel inputs.
//! 2. Release SH/LD → the chain is in shift mode, QH already shows the
//!    most significant bit.
//! 3. For each bit: read QH, then pulse CLK to shift the next bit in.
//!
//! Every edge is followed by `settle_us` (≥ 5 µs) to respect the chip
//! family's setup/hold timing. Nothing is cached; each call re-samples.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use crate::app::ports::SampleReader;
use crate::error::SensorError;

/// One snapshot of the input chain, MSB = first bit shifted out.
///
/// A `0` at a sensor's bit means that sensor is asserted (active-low
/// wiring with pull-ups).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSample(pub u32);

impl InputSample {
    /// Every input released (all lines pulled high).
    pub const RELEASED: Self = Self(u32::MAX);

    /// Raw level of `bit`.
    pub const fn bit(self, bit: u8) -> bool {
        (self.0 >> bit) & 1 == 1
    }
}

impl Default for InputSample {
    fn default() -> Self {
        Self::RELEASED
    }
}

/// Bit-banged reader for the 74HC165 chain.
pub struct SerialInputBus<LD, CK, Q, T> {
    load: LD,
    clock: CK,
    data: Q,
    delay: T,
    settle_us: u32,
    chips: u8,
}

impl<LD, CK, Q, T> SerialInputBus<LD, CK, Q, T>
where
    LD: OutputPin,
    CK: OutputPin,
    Q: InputPin,
    T: DelayNs,
{
    /// Take ownership of the pins. Load idles high, clock idles low.
    pub fn new(
        load: LD,
        clock: CK,
        data: Q,
        delay: T,
        settle_us: u32,
        chips: u8,
    ) -> Result<Self, SensorError> {
        let mut bus = Self {
            load,
            clock,
            data,
            delay,
            settle_us,
            chips: chips.clamp(1, 4),
        };
        drive(&mut bus.load, true)?;
        drive(&mut bus.clock, false)?;
        Ok(bus)
    }

    /// Number of bits in one sample.
    pub fn width(&self) -> u8 {
        self.chips * 8
    }

    fn read_bits(&mut self) -> Result<u32, SensorError> {
        drive(&mut self.load, false)?;
        self.delay.delay_us(self.settle_us);
        drive(&mut self.load, true)?;
        self.delay.delay_us(self.settle_us);

        let mut value: u32 = 0;
        for _ in 0..self.width() {
            let bit = self
                .data
                .is_high()
                .map_err(|_| SensorError::GpioReadFailed)?;
            value = (value << 1) | u32::from(bit);
            drive(&mut self.clock, true)?;
            self.delay.delay_us(self.settle_us);
            drive(&mut self.clock, false)?;
            self.delay.delay_us(self.settle_us);
        }
        Ok(value)
    }
}

impl<LD, CK, Q, T> SampleReader for SerialInputBus<LD, CK, Q, T>
where
    LD: OutputPin,
    CK: OutputPin,
    Q: InputPin,
    T: DelayNs,
{
    fn sample(&mut self) -> Result<InputSample, SensorError> {
        let bits = self.read_bits()?;
        // Bits beyond the chain width read as released.
        let unused = if self.width() >= 32 {
            0
        } else {
            u32::MAX << self.width()
        };
        Ok(InputSample(bits | unused))
    }
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), SensorError> {
    pin.set_state(PinState::from(high))
        .map_err(|_| SensorError::GpioWriteFailed)
}
