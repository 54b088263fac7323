//! Fuzz target: `PositionSnapshot::decode` + `PositionModel::restore`
//!
//! A stored snapshot is untrusted input: restoring it must keep every
//! compartment in range and every wheel uncalibrated.
//!
//! cargo fuzz run fuzz_snapshot_restore

#![no_main]

use libfuzzer_sys::fuzz_target;

use dispenser::config::{DispenserConfig, WHEEL_COUNT};
use dispenser::position::{PositionModel, PositionSnapshot};

fuzz_target!(|data: &[u8]| {
    let Some(snapshot) = PositionSnapshot::decode(data) else {
        return;
    };
    let mut model = PositionModel::from_config(&DispenserConfig::default());
    model.restore(&snapshot);
    for wheel in 0..WHEEL_COUNT {
        let p = model.position(wheel);
        assert!(p.compartment < model.compartments());
        assert!(!p.calibrated);
        assert_eq!(model.compartment_for_steps(p.steps), p.compartment);
    }
});
