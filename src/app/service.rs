//! Dispenser controller — the façade the rest of the firmware talks to.
//!
//! [`DispenserController`] owns the actuator bank, the input reader, the
//! scheduler and the position model. Ownership makes the single-writer
//! rule explicit: the output frame and the input sample can only change
//! through `&mut self`.
//!
//! ```text
//!  SampleReader ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                   │     DispenserController      │
//!  FrameWriter  ◀── │ Scheduler · Positions · Bank │
//!                   └──────────────────────────────┘
//! ```
//!
//! Every motion is started by a non-blocking call (`start_calibration`,
//! `move_to`, `rotate_by`) and driven by [`tick`](DispenserController::tick).
//! The blocking helpers (`calibrate`, `move_to_blocking`,
//! `run_until_idle`) simply tick against a [`MonotonicClock`] until the
//! wheel is idle; their duration is bounded by the motion's step and
//! time budgets.

use log::{error, info, warn};

use crate::config::{DispenserConfig, WHEEL_COUNT};
use crate::drivers::actuator_bank::{ActuatorBank, Channel};
use crate::drivers::shift_in::InputSample;
use crate::drivers::stepper::Direction;
use crate::error::{MotionError, Result};
use crate::pins;
use crate::position::{PositionModel, PositionSnapshot};
use crate::scheduler::{Finished, Motion, MotionOutcome, NotchGrid, Scheduler, TickReport};
use crate::sensors::buttons::ButtonBank;
use crate::sensors::limit::LimitSensor;

use super::commands::DispenserCommand;
use super::events::DispenserEvent;
use super::ports::{ConfigError, EventSink, FrameWriter, MonotonicClock, SampleReader};

// ───────────────────────────────────────────────────────────────
// Status
// ───────────────────────────────────────────────────────────────

/// Externally visible state of one wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelStatus {
    pub compartment: u8,
    pub calibrated: bool,
    pub is_moving: bool,
    /// Home sensor reading from the most recent sample.
    pub sensor_asserted: bool,
}

/// What the running motion on a wheel is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Calibrate,
    MoveTo { target: u8 },
    RotateBy { passes: u8 },
}

// ───────────────────────────────────────────────────────────────
// DispenserController
// ───────────────────────────────────────────────────────────────

pub struct DispenserController<W, R> {
    config: DispenserConfig,
    bank: ActuatorBank<W>,
    input: R,
    scheduler: Scheduler,
    positions: PositionModel,
    buttons: ButtonBank,
    channels: [Channel; WHEEL_COUNT],
    sensors: [LimitSensor; WHEEL_COUNT],
    jobs: [Option<Job>; WHEEL_COUNT],
    /// Outcome of each wheel's last finished motion, until collected.
    results: [Option<core::result::Result<(), MotionError>>; WHEEL_COUNT],
    last_sample: InputSample,
}

impl<W: FrameWriter, R: SampleReader> DispenserController<W, R> {
    /// Validate `config`, force every coil off and take a first sample.
    pub fn new(config: DispenserConfig, writer: W, mut input: R) -> Result<Self> {
        config.validate()?;

        let mut channels = [Channel::ALL[0]; WHEEL_COUNT];
        for (slot, wheel) in channels.iter_mut().zip(config.wheels.iter()) {
            *slot = Channel::new(wheel.channel)
                .ok_or(ConfigError::ValidationFailed("wheel channel out of range"))?;
        }
        let sensors = config.wheels.map(|w| LimitSensor::new(w.sensor_bit));

        let mut scheduler = Scheduler::new(config.step_interval_us, config.commit_mode);
        for (&channel, &sensor) in channels.iter().zip(sensors.iter()) {
            scheduler.attach_sensor(channel, sensor);
        }

        let mut bank = ActuatorBank::new(writer);
        bank.stop_all()?;
        let last_sample = input.sample()?;

        info!(
            "Dispenser: {} wheels, {} steps/compartment, step interval {} us",
            WHEEL_COUNT,
            config.steps_per_compartment(),
            scheduler.step_interval_us()
        );

        Ok(Self {
            positions: PositionModel::from_config(&config),
            buttons: ButtonBank::new(pins::BUTTON_BIT_BASE),
            config,
            bank,
            input,
            scheduler,
            channels,
            sensors,
            jobs: [None; WHEEL_COUNT],
            results: [None; WHEEL_COUNT],
            last_sample,
        })
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Sample the input chain once, advance every running wheel and emit
    /// the resulting events.
    ///
    /// A failed sample skips stepping for this tick. A failed frame commit
    /// is returned after the tick's bookkeeping is done.
    pub fn tick(&mut self, now_us: u64, sink: &mut impl EventSink) -> Result<TickReport> {
        let sample = self.input.sample()?;
        self.last_sample = sample;

        let report = self.scheduler.tick(&mut self.bank, now_us, sample);
        for finished in &report.finished {
            self.finish(*finished, sink);
        }

        for event in self.buttons.update(sample, (now_us / 1_000) as u32) {
            sink.emit(&DispenserEvent::Button(event));
        }

        match report.fault {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    // ── Motion requests (non-blocking) ────────────────────────

    /// Start homing: reverse until the home sensor triggers. A wheel that
    /// is already on its sensor completes on the next tick.
    pub fn start_calibration(&mut self, wheel: u8, now_us: u64, sink: &mut impl EventSink) -> Result<()> {
        let w = self.idle_wheel(wheel)?;
        let motion = Motion::home(
            Direction::Reverse,
            self.config.homing_step_limit,
            u64::from(self.config.calibration_timeout_ms) * 1_000,
        );
        self.begin(w, Job::Calibrate, motion, now_us, sink);
        Ok(())
    }

    /// Start positioning toward `compartment`. Returns the signed step
    /// delta; zero means the wheel is already there and nothing moves.
    pub fn move_to(
        &mut self,
        wheel: u8,
        compartment: u8,
        now_us: u64,
        sink: &mut impl EventSink,
    ) -> Result<i32> {
        let w = self.idle_wheel(wheel)?;
        self.positions.check_compartment(compartment)?;
        if !self.positions.is_calibrated(w) {
            warn!("Dispenser: wheel {} moving before calibration", wheel);
        }

        let current = self.positions.position(w).compartment;
        let delta = self.positions.delta_steps(current, compartment);
        if delta == 0 {
            self.positions.set_compartment(w, compartment);
            sink.emit(&DispenserEvent::MoveCompleted { wheel, compartment });
            return Ok(0);
        }

        // The wheel's own notches are crossed at every compartment boundary.
        let notches = NotchGrid {
            pitch: self.positions.steps_per_compartment(),
            window: self.config.notch_window_steps,
            origin: self.positions.offset_in_compartment(w),
        };
        let motion = Motion::steps(
            Direction::of_delta(delta),
            delta.unsigned_abs(),
            self.config.abort_move_on_sensor,
        )
        .with_notches(notches);
        info!("Dispenser: wheel {} {} -> {} ({} steps)", wheel, current, compartment, delta);
        self.begin(w, Job::MoveTo { target: compartment }, motion, now_us, sink);
        Ok(delta)
    }

    /// Start a forward rotation that stops after `compartments` sensor
    /// notches have fully passed.
    pub fn rotate_by(
        &mut self,
        wheel: u8,
        compartments: u8,
        now_us: u64,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let w = self.idle_wheel(wheel)?;
        if compartments == 0 {
            let compartment = self.positions.position(w).compartment;
            sink.emit(&DispenserEvent::MoveCompleted { wheel, compartment });
            return Ok(());
        }

        // A notch that never shows up should not spin the wheel forever.
        let step_limit = (u32::from(compartments) + 1).saturating_mul(self.config.steps_per_revolution);
        let motion = Motion::count_releases(Direction::Forward, compartments, step_limit);
        self.begin(w, Job::RotateBy { passes: compartments }, motion, now_us, sink);
        Ok(())
    }

    /// Loading rotation: `loading_passes` notches forward.
    pub fn load(&mut self, wheel: u8, now_us: u64, sink: &mut impl EventSink) -> Result<()> {
        self.rotate_by(wheel, self.config.loading_passes, now_us, sink)
    }

    /// Stop one wheel now and de-energise its coils.
    pub fn stop(&mut self, wheel: u8, sink: &mut impl EventSink) -> Result<()> {
        let w = self.wheel_index(wheel)?;
        let written = self.bank.stop(self.channels[w]);
        if let Some(f) = self.scheduler.cancel(self.channels[w]) {
            self.finish(f, sink);
        }
        written.map_err(Into::into)
    }

    /// Zero every output and drop all motions. Callable from any state and
    /// never fails; a bus error is logged.
    pub fn emergency_stop(&mut self, sink: &mut impl EventSink) {
        if let Err(e) = self.bank.stop_all() {
            error!("Dispenser: emergency stop commit failed: {}", e);
        }
        for f in self.scheduler.cancel_all() {
            self.finish(f, sink);
        }
        warn!("Dispenser: emergency stop");
        sink.emit(&DispenserEvent::EmergencyStop);
    }

    // ── Blocking helpers ──────────────────────────────────────

    /// Home `wheel` and wait for the result.
    pub fn calibrate(
        &mut self,
        wheel: u8,
        clock: &impl MonotonicClock,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        self.start_calibration(wheel, clock.now_us(), sink)?;
        self.run_until_idle(wheel, clock, sink)
    }

    /// Move to `compartment` and wait for the result.
    pub fn move_to_blocking(
        &mut self,
        wheel: u8,
        compartment: u8,
        clock: &impl MonotonicClock,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        self.move_to(wheel, compartment, clock.now_us(), sink)?;
        self.run_until_idle(wheel, clock, sink)
    }

    /// Tick until `wheel` is idle and return its last motion's result.
    /// A bus error stops the wheel before it is returned.
    pub fn run_until_idle(
        &mut self,
        wheel: u8,
        clock: &impl MonotonicClock,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let w = self.wheel_index(wheel)?;
        while self.jobs[w].is_some() {
            if let Err(e) = self.tick(clock.now_us(), sink) {
                if let Err(stop) = self.stop(wheel, sink) {
                    error!("Dispenser: wheel {} stop after bus error failed: {}", wheel, stop);
                }
                self.results[w] = None;
                return Err(e);
            }
        }
        match self.results[w].take() {
            Some(Err(e)) => Err(e.into()),
            _ => Ok(()),
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command. Motion commands are non-blocking.
    pub fn handle_command(
        &mut self,
        cmd: DispenserCommand,
        now_us: u64,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        match cmd {
            DispenserCommand::Calibrate { wheel } => self.start_calibration(wheel, now_us, sink),
            DispenserCommand::MoveTo { wheel, compartment } => {
                self.move_to(wheel, compartment, now_us, sink).map(|_| ())
            }
            DispenserCommand::RotateBy { wheel, compartments } => {
                self.rotate_by(wheel, compartments, now_us, sink)
            }
            DispenserCommand::Load { wheel } => self.load(wheel, now_us, sink),
            DispenserCommand::EmergencyStop => {
                self.emergency_stop(sink);
                Ok(())
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn status(&self, wheel: u8) -> Result<WheelStatus> {
        let w = self.wheel_index(wheel)?;
        let position = self.positions.position(w);
        Ok(WheelStatus {
            compartment: position.compartment,
            calibrated: position.calibrated,
            is_moving: self.jobs[w].is_some(),
            sensor_asserted: self.sensors[w].is_asserted(self.last_sample),
        })
    }

    pub fn is_idle(&self) -> bool {
        self.jobs.iter().all(Option::is_none)
    }

    /// Take the result of `wheel`'s last finished motion.
    pub fn take_result(&mut self, wheel: u8) -> Option<Result<()>> {
        let w = self.wheel_index(wheel).ok()?;
        self.results[w].take().map(|r| r.map_err(Into::into))
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        self.positions.snapshot()
    }

    /// Adopt stored positions. Wheels still need homing before they are
    /// reported as calibrated.
    pub fn restore(&mut self, snapshot: &PositionSnapshot) {
        self.positions.restore(snapshot);
    }

    pub fn config(&self) -> &DispenserConfig {
        &self.config
    }

    pub fn bank(&self) -> &ActuatorBank<W> {
        &self.bank
    }

    pub fn last_sample(&self) -> InputSample {
        self.last_sample
    }

    // ── Internals ─────────────────────────────────────────────

    fn wheel_index(&self, wheel: u8) -> core::result::Result<usize, MotionError> {
        if usize::from(wheel) < WHEEL_COUNT {
            Ok(usize::from(wheel))
        } else {
            Err(MotionError::InvalidWheel(wheel))
        }
    }

    fn idle_wheel(&self, wheel: u8) -> core::result::Result<usize, MotionError> {
        let w = self.wheel_index(wheel)?;
        if self.jobs[w].is_some() {
            return Err(MotionError::WheelBusy(wheel));
        }
        Ok(w)
    }

    fn begin(&mut self, w: usize, job: Job, motion: Motion, now_us: u64, sink: &mut impl EventSink) {
        self.scheduler
            .begin(&mut self.bank, self.channels[w], motion, now_us, self.last_sample);
        self.jobs[w] = Some(job);
        self.results[w] = None;
        sink.emit(&DispenserEvent::MotionStarted { wheel: w as u8 });
    }

    /// Fold a finished motion into the position model and report it.
    fn finish(&mut self, f: Finished, sink: &mut impl EventSink) {
        let Some(w) = self.channels.iter().position(|&c| c == f.channel) else {
            return;
        };
        let Some(job) = self.jobs[w].take() else {
            return;
        };
        let wheel = w as u8;

        let result = match (job, f.outcome) {
            (Job::Calibrate, MotionOutcome::Completed { steps }) => {
                info!("Dispenser: wheel {} homed after {} steps", wheel, steps);
                self.positions.mark_home(w);
                sink.emit(&DispenserEvent::Calibrated { wheel });
                Ok(())
            }
            (Job::Calibrate, outcome) => {
                let err = match outcome {
                    MotionOutcome::Cancelled { .. } => MotionError::Cancelled { wheel },
                    _ => MotionError::HardwareTimeout { wheel },
                };
                error!("Dispenser: wheel {} calibration failed: {}", wheel, err);
                self.positions.apply_steps(w, f.direction, outcome.steps());
                self.positions.invalidate(w);
                sink.emit(&DispenserEvent::CalibrationFailed { wheel, error: err });
                Err(err)
            }
            (Job::MoveTo { target }, MotionOutcome::Completed { .. }) => {
                self.positions.set_compartment(w, target);
                sink.emit(&DispenserEvent::MoveCompleted { wheel, compartment: target });
                Ok(())
            }
            (Job::RotateBy { passes }, MotionOutcome::Completed { .. }) => {
                let compartment = self.positions.advance_compartments(w, passes);
                sink.emit(&DispenserEvent::MoveCompleted { wheel, compartment });
                Ok(())
            }
            (_, MotionOutcome::Aborted { steps }) => {
                let compartment = self.positions.apply_steps(w, f.direction, steps);
                warn!("Dispenser: wheel {} sensor fired mid-travel at compartment {}", wheel, compartment);
                sink.emit(&DispenserEvent::MoveAborted { wheel, compartment });
                Err(MotionError::Aborted { wheel, compartment })
            }
            (_, MotionOutcome::Cancelled { steps }) => {
                let compartment = self.positions.apply_steps(w, f.direction, steps);
                sink.emit(&DispenserEvent::MoveCancelled { wheel, compartment });
                Err(MotionError::Cancelled { wheel })
            }
            (_, MotionOutcome::TimedOut { steps }) => {
                let compartment = self.positions.apply_steps(w, f.direction, steps);
                sink.emit(&DispenserEvent::MoveTimedOut { wheel, compartment });
                Err(MotionError::HardwareTimeout { wheel })
            }
        };
        self.results[w] = Some(result);
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
