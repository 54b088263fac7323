//! Integration tests for the DispenserController → Scheduler → ActuatorBank
//! pipeline against the simulated plant.
//!
//! Every test runs on the host. Positions are checked on the plant side,
//! i.e. from the frames that actually reached the latch.

use super::mock_hw::{FakeClock, Notch, Plant, PlantReader, PlantWriter, RecordingSink};

use std::cell::RefCell;
use std::rc::Rc;

use dispenser::app::commands::DispenserCommand;
use dispenser::app::events::DispenserEvent;
use dispenser::app::ports::MonotonicClock;
use dispenser::config::{CommitMode, DispenserConfig};
use dispenser::drivers::shift_out::OutputFrame;
use dispenser::error::{ActuatorError, Error, MotionError, SensorError};
use dispenser::sensors::buttons::{ButtonEvent, ButtonGesture};
use dispenser::DispenserController;

type Controller = DispenserController<PlantWriter, PlantReader>;

const INTERVAL: u64 = 2_000;

fn make(config: DispenserConfig, plant: &Rc<RefCell<Plant>>) -> Controller {
    DispenserController::new(config, PlantWriter(plant.clone()), PlantReader(plant.clone())).unwrap()
}

/// Plant where every wheel sits on a one-step home notch at position 0.
fn homed_plant() -> Rc<RefCell<Plant>> {
    let plant = Plant::shared();
    for ch in 0..3 {
        plant.borrow_mut().notches[ch].push(Notch { start: 0, width: 1 });
    }
    plant
}

// ── Calibration ───────────────────────────────────────────────

#[test]
fn calibrate_reverses_onto_the_home_notch() {
    let plant = Plant::shared();
    plant.borrow_mut().notches[0].push(Notch { start: 1900, width: 48 });
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(0, &clock, &mut sink).unwrap();

    // Approached in reverse, the notch's upper edge (1947) is hit first.
    assert_eq!(plant.borrow().positions[0], 1947 - 2048);
    let status = c.status(0).unwrap();
    assert_eq!(status.compartment, 0);
    assert!(status.calibrated);
    assert!(!status.is_moving);
    assert!(status.sensor_asserted);
    assert_eq!(plant.borrow().last_frame(), Some(OutputFrame::ZERO));
    assert!(sink.events.contains(&DispenserEvent::Calibrated { wheel: 0 }));
}

#[test]
fn calibrate_on_sensor_takes_no_steps() {
    let plant = homed_plant();
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(2, &clock, &mut sink).unwrap();
    assert_eq!(plant.borrow().positions[2], 0);
    assert_eq!(c.status(2).unwrap().compartment, 0);
}

#[test]
fn calibrate_without_sensor_times_out_on_step_budget() {
    let plant = Plant::shared();
    let config = DispenserConfig {
        homing_step_limit: 50,
        ..DispenserConfig::default()
    };
    let mut c = make(config, &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    let err = c.calibrate(0, &clock, &mut sink).unwrap_err();
    assert_eq!(err, Error::Motion(MotionError::HardwareTimeout { wheel: 0 }));
    assert_eq!(plant.borrow().positions[0], -50);
    assert!(!c.status(0).unwrap().calibrated);
    assert!(!c.status(0).unwrap().is_moving);
    assert_eq!(plant.borrow().last_frame(), Some(OutputFrame::ZERO));
    assert_eq!(
        sink.count(|e| matches!(e, DispenserEvent::CalibrationFailed { wheel: 0, .. })),
        1
    );
}

#[test]
fn calibrate_without_sensor_times_out_on_wall_clock() {
    let plant = Plant::shared();
    let config = DispenserConfig {
        calibration_timeout_ms: 1,
        ..DispenserConfig::default()
    };
    let mut c = make(config, &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    assert_eq!(
        c.calibrate(1, &clock, &mut sink),
        Err(Error::Motion(MotionError::HardwareTimeout { wheel: 1 }))
    );
    assert_eq!(plant.borrow().positions[1], 0);
}

// ── Positioning ───────────────────────────────────────────────

#[test]
fn move_from_two_to_five_issues_408_forward_steps() {
    let plant = homed_plant();
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(0, &clock, &mut sink).unwrap();
    c.move_to_blocking(0, 2, &clock, &mut sink).unwrap();
    assert_eq!(c.status(0).unwrap().compartment, 2);

    let before = plant.borrow().positions[0];
    let frames_before = plant.borrow().frames.len();
    c.move_to_blocking(0, 5, &clock, &mut sink).unwrap();

    let p = plant.borrow();
    assert_eq!(p.positions[0] - before, 408);
    assert_eq!(p.skipped_steps, 0);
    // One commit per step plus the final de-energise.
    assert_eq!(p.frames.len() - frames_before, 409);
    assert_eq!(c.status(0).unwrap().compartment, 5);
    assert!(sink.events.contains(&DispenserEvent::MoveCompleted { wheel: 0, compartment: 5 }));
}

#[test]
fn move_backwards_does_not_wrap() {
    let plant = homed_plant();
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(1, &clock, &mut sink).unwrap();
    c.move_to_blocking(1, 3, &clock, &mut sink).unwrap();
    c.move_to_blocking(1, 1, &clock, &mut sink).unwrap();
    assert_eq!(plant.borrow().positions[1], 136);
    assert_eq!(c.status(1).unwrap().compartment, 1);
}

#[test]
fn sensor_mid_travel_aborts_and_reports_compartment() {
    let plant = homed_plant();
    plant.borrow_mut().notches[0].push(Notch { start: 300, width: 10 });
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(0, &clock, &mut sink).unwrap();
    let err = c.move_to_blocking(0, 5, &clock, &mut sink).unwrap_err();

    assert_eq!(err, Error::Motion(MotionError::Aborted { wheel: 0, compartment: 2 }));
    assert_eq!(plant.borrow().positions[0], 300);
    let status = c.status(0).unwrap();
    assert_eq!(status.compartment, 2);
    assert!(!status.is_moving);
    assert_eq!(plant.borrow().last_frame().unwrap().nibble(0), 0);
    assert!(sink.events.contains(&DispenserEvent::MoveAborted { wheel: 0, compartment: 2 }));
}

#[test]
fn sensor_is_ignored_when_abort_disabled() {
    let plant = homed_plant();
    plant.borrow_mut().notches[0].push(Notch { start: 300, width: 10 });
    let config = DispenserConfig {
        abort_move_on_sensor: false,
        ..DispenserConfig::default()
    };
    let mut c = make(config, &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(0, &clock, &mut sink).unwrap();
    c.move_to_blocking(0, 5, &clock, &mut sink).unwrap();
    assert_eq!(plant.borrow().positions[0], 680);
}

// ── Counted rotation ──────────────────────────────────────────

fn notched_plant() -> Rc<RefCell<Plant>> {
    let plant = Plant::shared();
    for ch in 0..3 {
        for k in 0..15 {
            plant.borrow_mut().notches[ch].push(Notch { start: k * 136, width: 10 });
        }
    }
    plant
}

#[test]
fn rotate_by_stops_on_the_kth_release() {
    let plant = notched_plant();
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(0, &clock, &mut sink).unwrap();
    c.rotate_by(0, 3, clock.now_us(), &mut sink).unwrap();
    c.run_until_idle(0, &clock, &mut sink).unwrap();

    // Leaving the home notch [0, 10) is not a pass; the third notch is
    // [408, 418) and its release is first seen at 418.
    assert_eq!(plant.borrow().positions[0], 418);
    assert_eq!(c.status(0).unwrap().compartment, 3);
    assert_eq!(
        sink.count(|e| matches!(e, DispenserEvent::MoveCompleted { wheel: 0, .. })),
        1
    );
}

#[test]
fn load_command_uses_configured_passes() {
    let plant = notched_plant();
    let config = DispenserConfig {
        loading_passes: 2,
        ..DispenserConfig::default()
    };
    let mut c = make(config, &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(1, &clock, &mut sink).unwrap();
    c.handle_command(DispenserCommand::Load { wheel: 1 }, clock.now_us(), &mut sink)
        .unwrap();
    assert!(c.status(1).unwrap().is_moving);
    c.run_until_idle(1, &clock, &mut sink).unwrap();

    assert_eq!(plant.borrow().positions[1], 282);
    assert_eq!(c.status(1).unwrap().compartment, 2);
}

#[test]
fn single_pass_from_home_lands_in_the_next_compartment() {
    let plant = notched_plant();
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(0, &clock, &mut sink).unwrap();
    c.rotate_by(0, 1, clock.now_us(), &mut sink).unwrap();
    c.run_until_idle(0, &clock, &mut sink).unwrap();

    let position = plant.borrow().positions[0];
    assert_eq!(position, 146);
    assert_eq!(c.status(0).unwrap().compartment, 1);
    assert_eq!(position / 136, 1);
}

#[test]
fn move_across_compartment_notches_completes() {
    let plant = notched_plant();
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(0, &clock, &mut sink).unwrap();
    c.move_to_blocking(0, 3, &clock, &mut sink).unwrap();
    assert_eq!(plant.borrow().positions[0], 408);
    assert_eq!(c.status(0).unwrap().compartment, 3);

    // Reversing meets the upper edge of notch [272, 282) nine steps early.
    c.move_to_blocking(0, 2, &clock, &mut sink).unwrap();
    assert_eq!(plant.borrow().positions[0], 272);
    assert_eq!(c.status(0).unwrap().compartment, 2);
    assert_eq!(sink.count(|e| matches!(e, DispenserEvent::MoveAborted { .. })), 0);
}

#[test]
fn obstruction_between_notches_still_aborts() {
    let plant = notched_plant();
    plant.borrow_mut().notches[0].push(Notch { start: 200, width: 5 });
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(0, &clock, &mut sink).unwrap();
    assert_eq!(
        c.move_to_blocking(0, 3, &clock, &mut sink),
        Err(Error::Motion(MotionError::Aborted { wheel: 0, compartment: 1 }))
    );
    assert_eq!(plant.borrow().positions[0], 200);
}

#[test]
fn rotate_by_without_notches_times_out() {
    let plant = Plant::shared();
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.rotate_by(2, 1, clock.now_us(), &mut sink).unwrap();
    assert_eq!(
        c.run_until_idle(2, &clock, &mut sink),
        Err(Error::Motion(MotionError::HardwareTimeout { wheel: 2 }))
    );
    assert_eq!(plant.borrow().positions[2], 2 * 2048);
    assert_eq!(
        sink.count(|e| matches!(e, DispenserEvent::MoveTimedOut { wheel: 2, .. })),
        1
    );
}

// ── Scheduling ────────────────────────────────────────────────

#[test]
fn three_wheels_step_together_with_one_commit() {
    let plant = Plant::shared();
    let mut c = make(DispenserConfig::default(), &plant);
    let mut sink = RecordingSink::new();

    for wheel in 0..3 {
        c.move_to(wheel, 4, 0, &mut sink).unwrap();
    }
    let before = plant.borrow().frames.len();
    let report = c.tick(INTERVAL, &mut sink).unwrap();

    assert_eq!(report.steps, 3);
    assert_eq!(report.commits, 1);
    let p = plant.borrow();
    assert_eq!(p.frames.len(), before + 1);
    assert_eq!(&p.positions[..3], &[1, 1, 1]);
}

#[test]
fn legacy_commit_mode_writes_per_channel() {
    let plant = Plant::shared();
    let config = DispenserConfig {
        commit_mode: CommitMode::PerChannel,
        ..DispenserConfig::default()
    };
    let mut c = make(config, &plant);
    let mut sink = RecordingSink::new();

    for wheel in 0..3 {
        c.move_to(wheel, 4, 0, &mut sink).unwrap();
    }
    let report = c.tick(INTERVAL, &mut sink).unwrap();
    assert_eq!(report.commits, 3);
}

#[test]
fn ticks_before_the_interval_do_nothing() {
    let plant = Plant::shared();
    let mut c = make(DispenserConfig::default(), &plant);
    let mut sink = RecordingSink::new();

    c.move_to(0, 1, 0, &mut sink).unwrap();
    for t in [100, 500, 1_999] {
        let report = c.tick(t, &mut sink).unwrap();
        assert_eq!(report.steps, 0);
    }
    assert_eq!(plant.borrow().positions[0], 0);
    // Every tick samples the input chain exactly once.
    assert_eq!(plant.borrow().samples, 1 + 3);
}

// ── Stops ─────────────────────────────────────────────────────

#[test]
fn emergency_stop_zeroes_everything_mid_motion() {
    let plant = Plant::shared();
    let mut c = make(DispenserConfig::default(), &plant);
    let mut sink = RecordingSink::new();

    c.move_to(0, 3, 0, &mut sink).unwrap();
    c.rotate_by(1, 2, 0, &mut sink).unwrap();
    c.start_calibration(2, 0, &mut sink).unwrap();
    for k in 1..=5 {
        c.tick(k * INTERVAL, &mut sink).unwrap();
    }
    assert!(c.bank().any_running());

    c.emergency_stop(&mut sink);

    assert_eq!(plant.borrow().last_frame(), Some(OutputFrame::ZERO));
    assert_eq!(c.bank().frame(), OutputFrame::ZERO);
    assert!(!c.bank().any_running());
    assert!(c.is_idle());
    assert_eq!(sink.count(|e| matches!(e, DispenserEvent::MoveCancelled { .. })), 2);
    assert_eq!(
        sink.count(|e| matches!(e, DispenserEvent::CalibrationFailed { wheel: 2, .. })),
        1
    );
    assert_eq!(sink.events.last(), Some(&DispenserEvent::EmergencyStop));
    assert_eq!(
        c.take_result(0),
        Some(Err(Error::Motion(MotionError::Cancelled { wheel: 0 })))
    );

    // Nothing moves afterwards.
    let frames = plant.borrow().frames.len();
    c.tick(10 * INTERVAL, &mut sink).unwrap();
    assert_eq!(plant.borrow().frames.len(), frames);
}

#[test]
fn emergency_stop_from_idle_still_commits() {
    let plant = Plant::shared();
    let mut c = make(DispenserConfig::default(), &plant);
    let mut sink = RecordingSink::new();

    let before = plant.borrow().frames.len();
    c.handle_command(DispenserCommand::EmergencyStop, 0, &mut sink).unwrap();
    assert_eq!(plant.borrow().frames.len(), before + 1);
    assert_eq!(plant.borrow().last_frame(), Some(OutputFrame::ZERO));
}

#[test]
fn stop_cancels_one_wheel_only() {
    let plant = Plant::shared();
    let mut c = make(DispenserConfig::default(), &plant);
    let mut sink = RecordingSink::new();

    c.move_to(0, 3, 0, &mut sink).unwrap();
    c.move_to(1, 3, 0, &mut sink).unwrap();
    c.tick(INTERVAL, &mut sink).unwrap();
    c.tick(2 * INTERVAL, &mut sink).unwrap();

    c.stop(0, &mut sink).unwrap();
    assert!(!c.status(0).unwrap().is_moving);
    assert!(c.status(1).unwrap().is_moving);
    assert_eq!(plant.borrow().last_frame().unwrap().nibble(0), 0);
    assert_ne!(plant.borrow().last_frame().unwrap().nibble(1), 0);
    assert!(sink.events.contains(&DispenserEvent::MoveCancelled { wheel: 0, compartment: 0 }));
}

// ── Faults ────────────────────────────────────────────────────

#[test]
fn write_failure_stops_the_blocking_move() {
    let plant = homed_plant();
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(0, &clock, &mut sink).unwrap();
    plant.borrow_mut().fail_writes = true;
    assert_eq!(
        c.move_to_blocking(0, 3, &clock, &mut sink),
        Err(Error::Actuator(ActuatorError::GpioWriteFailed))
    );
    assert!(!c.status(0).unwrap().is_moving);
    assert!(!c.bank().is_running(dispenser::drivers::actuator_bank::Channel::ALL[0]));
}

#[test]
fn read_failure_skips_the_tick() {
    let plant = Plant::shared();
    let mut c = make(DispenserConfig::default(), &plant);
    let mut sink = RecordingSink::new();

    c.move_to(0, 1, 0, &mut sink).unwrap();
    plant.borrow_mut().fail_reads = true;
    assert_eq!(
        c.tick(INTERVAL, &mut sink).unwrap_err(),
        Error::Sensor(SensorError::GpioReadFailed)
    );
    assert_eq!(plant.borrow().positions[0], 0);

    plant.borrow_mut().fail_reads = false;
    c.tick(2 * INTERVAL, &mut sink).unwrap();
    assert_eq!(plant.borrow().positions[0], 1);
}

#[test]
fn invalid_command_is_rejected() {
    let plant = Plant::shared();
    let mut c = make(DispenserConfig::default(), &plant);
    let mut sink = RecordingSink::new();

    assert_eq!(
        c.handle_command(DispenserCommand::Calibrate { wheel: 7 }, 0, &mut sink),
        Err(Error::Motion(MotionError::InvalidWheel(7)))
    );
    assert_eq!(
        c.handle_command(DispenserCommand::MoveTo { wheel: 0, compartment: 20 }, 0, &mut sink),
        Err(Error::Motion(MotionError::InvalidCompartment(20)))
    );
    assert!(c.is_idle());
}

// ── Buttons & persistence ─────────────────────────────────────

#[test]
fn button_short_press_is_reported() {
    let plant = Plant::shared();
    let mut c = make(DispenserConfig::default(), &plant);
    let mut sink = RecordingSink::new();

    plant.borrow_mut().buttons_held[1] = true;
    c.tick(0, &mut sink).unwrap();
    c.tick(60_000, &mut sink).unwrap();
    plant.borrow_mut().buttons_held[1] = false;
    c.tick(100_000, &mut sink).unwrap();

    assert_eq!(
        sink.events,
        vec![DispenserEvent::Button(ButtonEvent {
            button: 1,
            gesture: ButtonGesture::ShortPress,
        })]
    );
}

#[test]
fn snapshot_restores_positions_uncalibrated() {
    let plant = homed_plant();
    let mut c = make(DispenserConfig::default(), &plant);
    let clock = FakeClock::new(INTERVAL);
    let mut sink = RecordingSink::new();

    c.calibrate(2, &clock, &mut sink).unwrap();
    c.move_to_blocking(2, 6, &clock, &mut sink).unwrap();
    let bytes = c.snapshot().encode().unwrap();

    let mut rebooted = make(DispenserConfig::default(), &Plant::shared());
    rebooted.restore(&dispenser::position::PositionSnapshot::decode(&bytes).unwrap());
    let status = rebooted.status(2).unwrap();
    assert_eq!(status.compartment, 6);
    assert!(!status.calibrated);
}
