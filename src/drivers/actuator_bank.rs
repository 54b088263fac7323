//! Actuator bank — four stepper channels packed into one output frame.
//!
//! The bank is the sole owner of the [`OutputFrame`] and of the
//! [`FrameWriter`] that latches it. Channel state can be *staged* (local
//! frame update only) and then pushed with one [`flush`](ActuatorBank::flush),
//! which is how the scheduler gets one hardware write per tick.
//!
//! ## Channel state machine
//!
//! ```text
//!   Stopped ──start(dir)──▶ Running(dir) ──stop / sensor──▶ Stopped
//! ```
//!
//! Stopping a channel zeroes its slot so idle coils carry no holding
//! current.

use crate::app::ports::FrameWriter;
use crate::drivers::shift_out::OutputFrame;
use crate::drivers::stepper::{Direction, StepIndex};
use crate::error::ActuatorError;

/// Motor channels on the output chain (4 bits each, 2 chips).
pub const CHANNEL_COUNT: usize = 4;

/// A validated channel id (`0..4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    pub const ALL: [Self; CHANNEL_COUNT] = [Self(0), Self(1), Self(2), Self(3)];

    pub const fn new(id: u8) -> Option<Self> {
        if (id as usize) < CHANNEL_COUNT {
            Some(Self(id))
        } else {
            None
        }
    }

    pub const fn id(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-channel motion state. Mutated only by the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorState {
    pub channel: Channel,
    pub step_index: StepIndex,
    pub running: bool,
    pub direction: Direction,
    /// Monotonic timestamp of the last step (µs).
    pub last_step_us: u64,
}

impl ActuatorState {
    const fn stopped(channel: Channel) -> Self {
        Self {
            channel,
            step_index: StepIndex::new(0),
            running: false,
            direction: Direction::Forward,
            last_step_us: 0,
        }
    }
}

pub struct ActuatorBank<W> {
    writer: W,
    states: [ActuatorState; CHANNEL_COUNT],
    frame: OutputFrame,
    dirty: bool,
}

impl<W: FrameWriter> ActuatorBank<W> {
    /// All channels start Stopped with a zero frame. Nothing is written
    /// until the first commit; call [`stop_all`](Self::stop_all) at boot to
    /// force the chain into a known state.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            states: Channel::ALL.map(ActuatorState::stopped),
            frame: OutputFrame::ZERO,
            dirty: false,
        }
    }

    // ── Run/stop state ─────────────────────────────────────────

    /// Mark `channel` running in `direction`. The first step is due one
    /// step interval after `now_us`.
    pub fn start(&mut self, channel: Channel, direction: Direction, now_us: u64) {
        let s = &mut self.states[channel.index()];
        s.running = true;
        s.direction = direction;
        s.last_step_us = now_us;
    }

    /// Stop `channel`, de-energise its coils and commit, even when the slot
    /// was already zero.
    pub fn stop(&mut self, channel: Channel) -> Result<(), ActuatorError> {
        self.stage_stop(channel);
        self.dirty = true;
        self.flush().map(|_| ())
    }

    /// Stop every channel and commit once, unconditionally.
    pub fn stop_all(&mut self) -> Result<(), ActuatorError> {
        for s in &mut self.states {
            s.running = false;
        }
        self.frame = OutputFrame::ZERO;
        self.dirty = true;
        self.flush().map(|_| ())
    }

    // ── Coil output ────────────────────────────────────────────

    /// Energise `step_index`'s pattern on `channel` and commit.
    pub fn set_step(&mut self, channel: Channel, step_index: StepIndex) -> Result<(), ActuatorError> {
        self.stage_step(channel, step_index);
        self.flush().map(|_| ())
    }

    /// Update `channel`'s slot in the local frame without committing.
    pub fn stage_step(&mut self, channel: Channel, step_index: StepIndex) {
        self.states[channel.index()].step_index = step_index;
        self.write_slot(channel, step_index.pattern());
    }

    /// Advance `channel` one micro-step in its direction (staged).
    pub fn stage_advance(&mut self, channel: Channel, now_us: u64) -> StepIndex {
        let s = self.states[channel.index()];
        let next = s.step_index.advance(s.direction);
        self.stage_step(channel, next);
        self.states[channel.index()].last_step_us = now_us;
        next
    }

    /// Mark `channel` stopped and zero its slot (staged).
    pub fn stage_stop(&mut self, channel: Channel) {
        self.states[channel.index()].running = false;
        self.write_slot(channel, 0);
    }

    /// Commit the frame if anything changed since the last commit.
    /// Returns whether a hardware write happened. A failed write leaves the
    /// frame dirty so the next flush retries it.
    pub fn flush(&mut self) -> Result<bool, ActuatorError> {
        if !self.dirty {
            return Ok(false);
        }
        self.writer.commit(self.frame)?;
        self.dirty = false;
        Ok(true)
    }

    fn write_slot(&mut self, channel: Channel, pattern: u8) {
        let next = self.frame.with_nibble(channel.index(), pattern);
        if next != self.frame {
            self.frame = next;
            self.dirty = true;
        }
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn state(&self, channel: Channel) -> &ActuatorState {
        &self.states[channel.index()]
    }

    pub fn is_running(&self, channel: Channel) -> bool {
        self.states[channel.index()].running
    }

    pub fn any_running(&self) -> bool {
        self.states.iter().any(|s| s.running)
    }

    pub fn frame(&self) -> OutputFrame {
        self.frame
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}
