//! Cooperative step scheduler.
//!
//! A single [`Scheduler::tick`] entry point, called repeatedly by the host
//! loop between unrelated firmware work, moves every running wheel at
//! most one micro-step per tick.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Scheduler::tick(now, sample)              │
//! │                                                              │
//! │   for channel 0 → 3:                                         │
//! │     sensor bit ──▶ EdgeDetector ──▶ edge                     │
//! │                                       │                      │
//! │                                       ▼                      │
//! │     ChannelMotion::advance(now, edge, due) ──▶ Hold          │
//! │                                            ──▶ Step ─┐       │
//! │                                            ──▶ Finish┤       │
//! │                                                      ▼       │
//! │                                      ActuatorBank (staged)   │
//! │                                                              │
//! │   ActuatorBank::flush()  ── one commit per tick ──▶ 74HC595   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Missed intervals are not caught up: a late tick still issues a single
//! step per channel, so the step rate is bounded by the tick rate.
//!
//! Every motion is described by one [`Motion`] and its [`StopPolicy`]:
//! homing (stop on first assert), loading (stop after N releases) and
//! positioning (fixed step budget, optionally aborted by a sensor trigger
//! off the compartment [`NotchGrid`]) all run through the same path.

use heapless::Vec;
use log::{debug, info, warn};

use crate::app::ports::FrameWriter;
use crate::config::{CommitMode, MAX_STEP_INTERVAL_US, MIN_STEP_INTERVAL_US};
use crate::drivers::actuator_bank::{ActuatorBank, CHANNEL_COUNT, Channel};
use crate::drivers::shift_in::InputSample;
use crate::drivers::stepper::Direction;
use crate::error::ActuatorError;
use crate::sensors::edge::{EdgeDetector, EdgeKind};
use crate::sensors::limit::LimitSensor;

// ═══════════════════════════════════════════════════════════════
//  Motion description
// ═══════════════════════════════════════════════════════════════

/// When a motion has reached its goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Stop as soon as the sensor goes released → asserted (homing).
    FirstAssert,
    /// Stop after this many asserted → released transitions (loading).
    Releases(u8),
    /// Stop after exactly this many steps (positioning).
    Steps(u32),
}

/// Positions at which a sensor assert is expected rather than a fault:
/// within `window` steps of every multiple of `pitch`, measured from a
/// point `origin` steps past the previous multiple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotchGrid {
    pub pitch: u32,
    pub window: u32,
    pub origin: u32,
}

impl NotchGrid {
    /// Whether an assert seen after `steps` steps in `direction` lines up
    /// with a notch.
    pub fn expects(self, direction: Direction, steps: u32) -> bool {
        if self.pitch == 0 {
            return false;
        }
        let pitch = i64::from(self.pitch);
        let at = i64::from(self.origin) + i64::from(direction.sign()) * i64::from(steps);
        let r = at.rem_euclid(pitch);
        r.min(pitch - r) <= i64::from(self.window)
    }
}

/// A requested motion for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Motion {
    pub direction: Direction,
    pub policy: StopPolicy,
    /// Abort early when the sensor goes released → asserted.
    pub abort_on_assert: bool,
    /// Asserts on this grid pass through instead of aborting.
    pub notches: Option<NotchGrid>,
    /// Give up after this many steps without meeting the policy.
    pub step_limit: Option<u32>,
    /// Give up after this much time without meeting the policy (µs).
    pub time_limit_us: Option<u64>,
}

impl Motion {
    /// Run in `direction` until the sensor triggers.
    pub const fn home(direction: Direction, step_limit: u32, time_limit_us: u64) -> Self {
        Self {
            direction,
            policy: StopPolicy::FirstAssert,
            abort_on_assert: false,
            notches: None,
            step_limit: Some(step_limit),
            time_limit_us: Some(time_limit_us),
        }
    }

    /// Run until `passes` sensor notches have fully passed.
    pub const fn count_releases(direction: Direction, passes: u8, step_limit: u32) -> Self {
        Self {
            direction,
            policy: StopPolicy::Releases(passes),
            abort_on_assert: false,
            notches: None,
            step_limit: Some(step_limit),
            time_limit_us: None,
        }
    }

    /// Run exactly `steps` steps.
    pub const fn steps(direction: Direction, steps: u32, abort_on_assert: bool) -> Self {
        Self {
            direction,
            policy: StopPolicy::Steps(steps),
            abort_on_assert,
            notches: None,
            step_limit: None,
            time_limit_us: None,
        }
    }

    /// Tolerate asserts that fall on `grid`.
    #[must_use]
    pub const fn with_notches(mut self, grid: NotchGrid) -> Self {
        self.notches = Some(grid);
        self
    }
}

/// How a motion ended. `steps` counts the micro-steps actually issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    Completed { steps: u32 },
    /// The sensor fired while `abort_on_assert` was set.
    Aborted { steps: u32 },
    /// Step or time budget exhausted.
    TimedOut { steps: u32 },
    /// Stopped from outside (stop / emergency stop).
    Cancelled { steps: u32 },
}

impl MotionOutcome {
    pub const fn steps(self) -> u32 {
        match self {
            Self::Completed { steps }
            | Self::Aborted { steps }
            | Self::TimedOut { steps }
            | Self::Cancelled { steps } => steps,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Per-channel actuator
// ═══════════════════════════════════════════════════════════════

/// What a channel observed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInput {
    pub now_us: u64,
    pub edge: EdgeKind,
    /// The step interval has elapsed since the channel's last step.
    pub due: bool,
}

/// A channel's decision for this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Hold,
    Step,
    Finish(MotionOutcome),
}

/// One independently advancing actuator.
pub trait Actuator {
    fn advance(&mut self, input: TickInput) -> Advance;
}

/// Progress of a motion in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMotion {
    motion: Motion,
    started_us: u64,
    steps: u32,
    releases: u8,
    /// Started on a notch; its release is a departure, not a pass.
    departing: bool,
}

impl ChannelMotion {
    pub const fn new(motion: Motion, started_us: u64) -> Self {
        Self {
            motion,
            started_us,
            steps: 0,
            releases: 0,
            departing: false,
        }
    }

    /// The sensor was asserted when the motion began.
    #[must_use]
    pub const fn departing(mut self) -> Self {
        self.departing = true;
        self
    }

    pub const fn motion(&self) -> &Motion {
        &self.motion
    }

    pub const fn steps(&self) -> u32 {
        self.steps
    }

    pub const fn releases(&self) -> u8 {
        self.releases
    }
}

impl Actuator for ChannelMotion {
    fn advance(&mut self, input: TickInput) -> Advance {
        let steps = self.steps;

        // Sensor transitions take effect immediately, due or not.
        match input.edge {
            EdgeKind::ReleasedToAsserted => {
                if self.motion.policy == StopPolicy::FirstAssert {
                    return Advance::Finish(MotionOutcome::Completed { steps });
                }
                let expected = self
                    .motion
                    .notches
                    .is_some_and(|g| g.expects(self.motion.direction, steps));
                if self.motion.abort_on_assert && !expected {
                    return Advance::Finish(MotionOutcome::Aborted { steps });
                }
            }
            EdgeKind::AssertedToReleased if self.departing => {
                self.departing = false;
            }
            EdgeKind::AssertedToReleased => {
                if let StopPolicy::Releases(target) = self.motion.policy {
                    self.releases = self.releases.saturating_add(1);
                    if self.releases >= target {
                        return Advance::Finish(MotionOutcome::Completed { steps });
                    }
                }
            }
            EdgeKind::None => {}
        }

        if let Some(limit) = self.motion.time_limit_us {
            if input.now_us.saturating_sub(self.started_us) >= limit {
                return Advance::Finish(MotionOutcome::TimedOut { steps });
            }
        }

        if !input.due {
            return Advance::Hold;
        }

        // The last budgeted step is held for one interval before release.
        if let StopPolicy::Steps(total) = self.motion.policy {
            if steps >= total {
                return Advance::Finish(MotionOutcome::Completed { steps });
            }
        }
        if let Some(limit) = self.motion.step_limit {
            if steps >= limit {
                return Advance::Finish(MotionOutcome::TimedOut { steps });
            }
        }

        self.steps += 1;
        Advance::Step
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

/// A motion that ended during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finished {
    pub channel: Channel,
    pub direction: Direction,
    pub outcome: MotionOutcome,
}

/// Summary of one [`Scheduler::tick`].
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Motions that ended this tick, in channel order.
    pub finished: Vec<Finished, CHANNEL_COUNT>,
    /// Micro-steps issued this tick (at most one per channel).
    pub steps: u8,
    /// Hardware frame commits this tick.
    pub commits: u8,
    /// Output chain write failure, if any. Channel state is still updated.
    pub fault: Option<ActuatorError>,
}

/// The scheduler engine. Owns every channel's motion and edge state; the
/// output frame stays with the [`ActuatorBank`] passed into each call.
pub struct Scheduler {
    motions: [Option<ChannelMotion>; CHANNEL_COUNT],
    sensors: [Option<LimitSensor>; CHANNEL_COUNT],
    edges: EdgeDetector,
    step_interval_us: u32,
    commit_mode: CommitMode,
}

impl Scheduler {
    pub fn new(step_interval_us: u32, commit_mode: CommitMode) -> Self {
        if commit_mode == CommitMode::PerChannel {
            warn!("Scheduler: per-channel commit mode (legacy) selected");
        }
        Self {
            motions: [None; CHANNEL_COUNT],
            sensors: [None; CHANNEL_COUNT],
            edges: EdgeDetector::new(),
            step_interval_us: step_interval_us.clamp(MIN_STEP_INTERVAL_US, MAX_STEP_INTERVAL_US),
            commit_mode,
        }
    }

    /// Bind the home sensor that stop policies of `channel` observe.
    pub fn attach_sensor(&mut self, channel: Channel, sensor: LimitSensor) {
        self.sensors[channel.index()] = Some(sensor);
    }

    /// Global cadence, clamped to 10 µs – 100 ms.
    pub fn set_step_interval_us(&mut self, interval_us: u32) {
        self.step_interval_us = interval_us.clamp(MIN_STEP_INTERVAL_US, MAX_STEP_INTERVAL_US);
    }

    pub fn step_interval_us(&self) -> u32 {
        self.step_interval_us
    }

    pub fn is_active(&self, channel: Channel) -> bool {
        self.motions[channel.index()].is_some()
    }

    pub fn progress(&self, channel: Channel) -> Option<&ChannelMotion> {
        self.motions[channel.index()].as_ref()
    }

    /// Start `motion` on `channel`.
    ///
    /// Homing starts from a "released" edge state so a wheel already
    /// sitting on its sensor stops at once; every other motion starts from
    /// the current reading, and leaving the notch it starts on neither
    /// aborts nor counts as a pass.
    pub fn begin<W: FrameWriter>(
        &mut self,
        bank: &mut ActuatorBank<W>,
        channel: Channel,
        motion: Motion,
        now_us: u64,
        sample: InputSample,
    ) {
        self.edges.reset(channel);
        let mut progress = ChannelMotion::new(motion, now_us);
        if motion.policy != StopPolicy::FirstAssert {
            let asserted = self.asserted(channel, sample);
            self.edges.observe(channel, asserted);
            if asserted {
                progress = progress.departing();
            }
        }
        self.motions[channel.index()] = Some(progress);
        bank.start(channel, motion.direction, now_us);
        info!(
            "Scheduler: channel {} start {:?} {:?}",
            channel.id(),
            motion.direction,
            motion.policy
        );
    }

    /// Drop `channel`'s motion without touching the bank; the caller stops
    /// the output. Returns the cancelled motion, if one was running.
    pub fn cancel(&mut self, channel: Channel) -> Option<Finished> {
        self.motions[channel.index()].take().map(|m| Finished {
            channel,
            direction: m.motion.direction,
            outcome: MotionOutcome::Cancelled { steps: m.steps },
        })
    }

    /// Drop every motion without touching the bank; the caller stops the
    /// outputs (emergency stop). Returns the cancelled motions.
    pub fn cancel_all(&mut self) -> Vec<Finished, CHANNEL_COUNT> {
        let mut cancelled = Vec::new();
        for channel in Channel::ALL {
            if let Some(f) = self.cancel(channel) {
                let _ = cancelled.push(f);
            }
        }
        cancelled
    }

    fn asserted(&self, channel: Channel, sample: InputSample) -> bool {
        self.sensors[channel.index()].is_some_and(|s| s.is_asserted(sample))
    }

    /// Advance every running channel whose interval elapsed, then commit
    /// the combined frame once if anything changed.
    pub fn tick<W: FrameWriter>(
        &mut self,
        bank: &mut ActuatorBank<W>,
        now_us: u64,
        sample: InputSample,
    ) -> TickReport {
        let mut report = TickReport::default();

        for channel in Channel::ALL {
            let i = channel.index();
            let asserted = self.asserted(channel, sample);
            let Some(motion) = self.motions[i].as_mut() else {
                continue;
            };

            // Stopped from outside since the last tick.
            if !bank.is_running(channel) {
                let _ = report.finished.push(Finished {
                    channel,
                    direction: motion.motion.direction,
                    outcome: MotionOutcome::Cancelled { steps: motion.steps },
                });
                self.motions[i] = None;
                continue;
            }

            let edge = self.edges.observe(channel, asserted);
            let elapsed = now_us.saturating_sub(bank.state(channel).last_step_us);
            let due = elapsed >= u64::from(self.step_interval_us);

            match motion.advance(TickInput { now_us, edge, due }) {
                Advance::Hold => continue,
                Advance::Step => {
                    let index = bank.stage_advance(channel, now_us);
                    report.steps += 1;
                    debug!("Scheduler: channel {} step -> {}", channel.id(), index.get());
                }
                Advance::Finish(outcome) => {
                    bank.stage_stop(channel);
                    info!("Scheduler: channel {} finished {:?}", channel.id(), outcome);
                    let _ = report.finished.push(Finished {
                        channel,
                        direction: motion.motion.direction,
                        outcome,
                    });
                    self.motions[i] = None;
                }
            }

            if self.commit_mode == CommitMode::PerChannel {
                Self::flush(bank, &mut report);
            }
        }

        Self::flush(bank, &mut report);
        report
    }

    fn flush<W: FrameWriter>(bank: &mut ActuatorBank<W>, report: &mut TickReport) {
        match bank.flush() {
            Ok(true) => report.commits += 1,
            Ok(false) => {}
            Err(e) => {
                log::error!("Scheduler: frame commit failed: {e}");
                report.fault = Some(e);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
