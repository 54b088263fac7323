//! Fuzz target: `DispenserConfig::decode`
//!
//! Feeds arbitrary bytes to the config decoder. Anything it accepts must
//! pass validation and be usable to build a controller.
//!
//! cargo fuzz run fuzz_config_decode

#![no_main]

use libfuzzer_sys::fuzz_target;

use dispenser::app::ports::{FrameWriter, SampleReader};
use dispenser::config::DispenserConfig;
use dispenser::drivers::shift_in::InputSample;
use dispenser::drivers::shift_out::OutputFrame;
use dispenser::error::{ActuatorError, SensorError};
use dispenser::DispenserController;

struct Null;

impl FrameWriter for Null {
    fn commit(&mut self, _frame: OutputFrame) -> Result<(), ActuatorError> {
        Ok(())
    }
}

impl SampleReader for Null {
    fn sample(&mut self) -> Result<InputSample, SensorError> {
        Ok(InputSample::RELEASED)
    }
}

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = DispenserConfig::decode(data) {
        assert!(config.validate().is_ok());
        assert!(config.steps_per_compartment() > 0);
        assert!(DispenserController::new(config, Null, Null).is_ok());
    }
});
