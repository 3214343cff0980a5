//! Shared setup for the bridge integration tests.

#![allow(dead_code)]

use pds_se30::testbench::{TickRecord, Testbench};
use pds_se30::{BridgeConfig, DataDriver, Se30Bridge};

pub const MAX_TICKS: u32 = 64;

/// Bench with the default configuration and an immediate grant.
pub fn bench() -> Testbench {
    Testbench::new(Se30Bridge::new())
}

pub fn bench_with(config: BridgeConfig) -> Testbench {
    Testbench::new(Se30Bridge::with_config(config).expect("valid config"))
}

/// Checks that must hold on every tick of any run.
pub fn assert_exclusive(history: &[TickRecord]) {
    for (i, record) in history.iter().enumerate() {
        assert!(
            !(record.slave_busy() && record.master_busy()),
            "tick {i}: slave {} and master {} both active",
            record.probe.slave,
            record.probe.master
        );

        let out = &record.outputs;
        if out.address.enable || out.control.enable {
            assert_eq!(
                record.probe.arbiter, "OWN",
                "tick {i}: address/control driven without owning the bus"
            );
        }
        if out.data_driver == DataDriver::Master {
            assert_eq!(record.probe.arbiter, "OWN", "tick {i}: master data without ownership");
        }
        if out.any_acknowledge() {
            assert!(record.slave_busy(), "tick {i}: /DSACK with idle slave");
        }
        assert!(
            !(out.requesting_bus() && out.claiming_bus()),
            "tick {i}: /BR and /BGACK together"
        );
    }
}

/// First tick index in `history` matching `pred`.
pub fn first_tick(history: &[TickRecord], pred: impl Fn(&TickRecord) -> bool) -> Option<usize> {
    history.iter().position(pred)
}
