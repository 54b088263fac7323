//! Dispenser firmware — main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  SerialOutputBus   SerialInputBus   LogEventSink  Esp32Time  │
//! │  (FrameWriter)     (SampleReader)   (EventSink)   (Clock)    │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │        DispenserController (pure logic)                │  │
//! │  │  Scheduler · PositionModel · ActuatorBank              │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Result;
use esp_idf_hal::delay::{Ets, FreeRtos};
use esp_idf_hal::gpio::{AnyIOPin, PinDriver, Pull};
use log::{error, info, warn};

use dispenser::adapters::log_sink::LogEventSink;
use dispenser::adapters::time::Esp32TimeAdapter;
use dispenser::app::commands::DispenserCommand;
use dispenser::app::events::DispenserEvent;
use dispenser::app::ports::{EventSink, MonotonicClock};
use dispenser::config::{DispenserConfig, WHEEL_COUNT};
use dispenser::drivers::shift_in::SerialInputBus;
use dispenser::drivers::shift_out::SerialOutputBus;
use dispenser::pins;
use dispenser::sensors::buttons::{ButtonEvent, ButtonGesture};
use dispenser::DispenserController;

// ── Event sink ────────────────────────────────────────────────
//
// Logs everything and keeps button gestures for the main loop to act on.

struct ConsoleSink {
    log: LogEventSink,
    buttons: heapless::Vec<ButtonEvent, 8>,
}

impl EventSink for ConsoleSink {
    fn emit(&mut self, event: &DispenserEvent) {
        self.log.emit(event);
        if let DispenserEvent::Button(b) = event {
            if self.buttons.push(*b).is_err() {
                warn!("Buttons: gesture queue full, dropping {:?}", b);
            }
        }
    }
}

/// Front panel: short press on buttons 0..2 loads that wheel, a long
/// press on any button stops everything.
fn button_command(event: ButtonEvent) -> Option<DispenserCommand> {
    match event.gesture {
        ButtonGesture::LongPress => Some(DispenserCommand::EmergencyStop),
        ButtonGesture::ShortPress if usize::from(event.button) < WHEEL_COUNT => {
            Some(DispenserCommand::Load { wheel: event.button })
        }
        ButtonGesture::ShortPress => None,
    }
}

fn output_pin(gpio: i32) -> Result<PinDriver<'static, AnyIOPin, esp_idf_hal::gpio::Output>> {
    // SAFETY: every GPIO number comes from `pins` and is claimed exactly once.
    Ok(PinDriver::output(unsafe { AnyIOPin::new(gpio) })?)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Dispenser v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Config (persistence lives outside this core) ───────
    let config = DispenserConfig::default().clamped();

    // ── 3. Shift-register buses ───────────────────────────────
    let out_bus = SerialOutputBus::new(
        output_pin(pins::OUT_DATA_GPIO)?,
        output_pin(pins::OUT_CLOCK_GPIO)?,
        output_pin(pins::OUT_LATCH_GPIO)?,
        Ets,
        config.output_pulse_us,
    )?;

    // SAFETY: see `output_pin`.
    let mut data_in = PinDriver::input(unsafe { AnyIOPin::new(pins::IN_DATA_GPIO) })?;
    data_in.set_pull(Pull::Up)?;
    let in_bus = SerialInputBus::new(
        output_pin(pins::IN_LOAD_GPIO)?,
        output_pin(pins::IN_CLOCK_GPIO)?,
        data_in,
        Ets,
        config.input_settle_us,
        config.input_chips,
    )?;

    // ── 4. Controller ─────────────────────────────────────────
    let clock = Esp32TimeAdapter::new();
    let mut sink = ConsoleSink {
        log: LogEventSink::new(),
        buttons: heapless::Vec::new(),
    };
    let mut dispenser = DispenserController::new(config, out_bus, in_bus)?;

    for wheel in 0..WHEEL_COUNT as u8 {
        // A wheel that fails to home stays usable for manual recovery.
        if let Err(e) = dispenser.calibrate(wheel, &clock, &mut sink) {
            error!("Boot: wheel {} calibration failed: {}", wheel, e);
        }
    }

    info!("System ready. Entering control loop.");

    // ── 5. Control loop ───────────────────────────────────────
    loop {
        if let Err(e) = dispenser.tick(clock.now_us(), &mut sink) {
            error!("Control: tick failed: {}", e);
            dispenser.emergency_stop(&mut sink);
        }

        let pending = core::mem::take(&mut sink.buttons);
        for cmd in pending.into_iter().filter_map(button_command) {
            if let Err(e) = dispenser.handle_command(cmd, clock.now_us(), &mut sink) {
                warn!("Control: {:?} rejected: {}", cmd, e);
            }
        }

        // Yield to the idle task while nothing is turning.
        if dispenser.is_idle() {
            FreeRtos::delay_ms(10);
        }
    }
}
