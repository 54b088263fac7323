//! Simulated dispenser hardware for integration tests.
//!
//! [`Plant`] models the four motors and their home sensors: every committed
//! frame is decoded back into micro-steps, and each wheel's sensor is
//! asserted while its position sits inside one of its notches. The writer
//! and reader halves share the plant so tests can inspect it after handing
//! them to the controller.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use dispenser::app::events::DispenserEvent;
use dispenser::app::ports::{EventSink, FrameWriter, MonotonicClock, SampleReader};
use dispenser::drivers::actuator_bank::CHANNEL_COUNT;
use dispenser::drivers::shift_in::InputSample;
use dispenser::drivers::shift_out::OutputFrame;
use dispenser::drivers::stepper::pattern_for;
use dispenser::error::{ActuatorError, SensorError};
use dispenser::pins;

/// Steps per wheel revolution in the default configuration.
pub const REVOLUTION: i32 = 2048;

// ── Plant ─────────────────────────────────────────────────────

/// A sensor window `[start, start + width)` in steps, taken mod one
/// revolution.
#[derive(Debug, Clone, Copy)]
pub struct Notch {
    pub start: i32,
    pub width: i32,
}

#[derive(Debug, Default)]
pub struct Plant {
    /// Signed micro-steps each motor has turned since power-up.
    pub positions: [i32; CHANNEL_COUNT],
    pub notches: [Vec<Notch>; CHANNEL_COUNT],
    /// Every frame that reached the latch.
    pub frames: Vec<OutputFrame>,
    /// Buttons (0..4) currently held down.
    pub buttons_held: [bool; 4],
    pub fail_writes: bool,
    pub fail_reads: bool,
    pub samples: usize,
    /// A step pattern that was neither ±1 from the previous one.
    pub skipped_steps: usize,
    /// Commutation index each rotor is aligned to (power-up: 0).
    rotor: [u8; CHANNEL_COUNT],
}

impl Plant {
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn sensor_asserted(&self, channel: usize) -> bool {
        let p = self.positions[channel].rem_euclid(REVOLUTION);
        self.notches[channel]
            .iter()
            .any(|n| p >= n.start && p < n.start + n.width)
    }

    pub fn last_frame(&self) -> Option<OutputFrame> {
        self.frames.last().copied()
    }

    fn latch(&mut self, frame: OutputFrame) {
        for ch in 0..CHANNEL_COUNT {
            // De-energised coils leave the rotor where it was.
            let Some(to) = index_of(frame.nibble(ch)) else {
                continue;
            };
            match (to + 8 - self.rotor[ch]) % 8 {
                0 => {}
                1 => self.positions[ch] += 1,
                7 => self.positions[ch] -= 1,
                _ => self.skipped_steps += 1,
            }
            self.rotor[ch] = to;
        }
        self.frames.push(frame);
    }
}

/// Position of `pattern` in the commutation table.
fn index_of(pattern: u8) -> Option<u8> {
    (0..8).find(|&i| pattern != 0 && pattern_for(i) == pattern)
}

// ── Port implementations ──────────────────────────────────────

pub struct PlantWriter(pub Rc<RefCell<Plant>>);

impl FrameWriter for PlantWriter {
    fn commit(&mut self, frame: OutputFrame) -> Result<(), ActuatorError> {
        let mut plant = self.0.borrow_mut();
        if plant.fail_writes {
            return Err(ActuatorError::GpioWriteFailed);
        }
        plant.latch(frame);
        Ok(())
    }
}

/// Reads the plant with the default wiring: wheel `i` on bit `4 + i`,
/// buttons on bits `0..4`.
pub struct PlantReader(pub Rc<RefCell<Plant>>);

impl SampleReader for PlantReader {
    fn sample(&mut self) -> Result<InputSample, SensorError> {
        let mut plant = self.0.borrow_mut();
        if plant.fail_reads {
            return Err(SensorError::GpioReadFailed);
        }
        plant.samples += 1;
        let mut bits = u32::MAX;
        for ch in 0..CHANNEL_COUNT {
            if plant.sensor_asserted(ch) {
                bits &= !(1 << (pins::WHEEL_SENSOR_BIT_BASE as usize + ch));
            }
        }
        for (b, held) in plant.buttons_held.iter().enumerate() {
            if *held {
                bits &= !(1 << (pins::BUTTON_BIT_BASE as usize + b));
            }
        }
        Ok(InputSample(bits))
    }
}

// ── Clock ─────────────────────────────────────────────────────

/// Advances by a fixed amount on every read, so a blocking loop that reads
/// the clock once per tick sees one step interval pass per tick.
pub struct FakeClock {
    now: Cell<u64>,
    step_us: u64,
}

impl FakeClock {
    pub fn new(step_us: u64) -> Self {
        Self {
            now: Cell::new(0),
            step_us,
        }
    }

    pub fn peek(&self) -> u64 {
        self.now.get()
    }
}

impl MonotonicClock for FakeClock {
    fn now_us(&self) -> u64 {
        let t = self.now.get() + self.step_us;
        self.now.set(t);
        t
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<DispenserEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&DispenserEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &DispenserEvent) {
        self.events.push(*event);
    }
}
