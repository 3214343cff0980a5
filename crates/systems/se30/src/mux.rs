//! Output direction multiplexer.
//!
//! Pure function from the three drivers' wishes to pad enables. The slave
//! responder can only ever ask for data and /DSACK, the master engine for
//! address, control and data, the arbiter for /BR and /BGACK. Data is the one
//! contested line; the slave and master cannot both be busy (the arbiter will
//! not own the bus over a busy slave, and no slave cycle starts while it owns
//! the bus), so at most one request reaches it.

use crate::arbiter::ArbiterDrive;
use crate::master::MasterDrive;
use crate::pads::{BufferControl, DataDriver, PdsOutputs};
use crate::slave::SlaveDrive;
use pds_core::signal::TriState;

fn pull_low_if(asserted: bool) -> TriState<bool> {
    if asserted {
        TriState::pull_low()
    } else {
        TriState::released()
    }
}

pub fn resolve(slave: &SlaveDrive, master: &MasterDrive, arbiter: &ArbiterDrive) -> PdsOutputs {
    debug_assert!(
        slave.data.is_none() || master.data.is_none(),
        "slave and master both driving the data bus"
    );

    let (data_driver, data) = match (slave.data, master.data) {
        (Some(value), _) => (DataDriver::Slave, TriState::driven(value)),
        (None, Some(value)) => (DataDriver::Master, TriState::driven(value)),
        (None, None) => (DataDriver::None, TriState::released()),
    };

    let address = master.address.map_or_else(TriState::released, TriState::driven);
    let control = master.control.map_or_else(TriState::released, TriState::driven);

    let buffers = BufferControl {
        data_dir_out: data.enable,
        addr_dir_out: address.enable || control.enable,
        enable_n: false,
    };

    PdsOutputs {
        address,
        data,
        control,
        dsack0_n: pull_low_if(slave.acknowledge),
        dsack1_n: pull_low_if(slave.acknowledge),
        br_n: pull_low_if(arbiter.bus_request),
        bgack_n: pull_low_if(arbiter.bus_in_use),
        data_driver,
        buffers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pads::ControlLines;

    #[test]
    fn nothing_requested_releases_everything() {
        let out = resolve(
            &SlaveDrive::default(),
            &MasterDrive::default(),
            &ArbiterDrive::default(),
        );
        assert_eq!(out.data_driver, DataDriver::None);
        assert!(!out.data.enable && !out.address.enable && !out.control.enable);
        assert!(!out.any_acknowledge() && !out.requesting_bus() && !out.claiming_bus());
        assert!(!out.buffers.data_dir_out && !out.buffers.addr_dir_out);
        assert!(!out.buffers.enable_n);
    }

    #[test]
    fn slave_read_drive() {
        let slave = SlaveDrive {
            data: Some(0xDEAD_BEEF),
            acknowledge: true,
        };
        let out = resolve(&slave, &MasterDrive::default(), &ArbiterDrive::default());
        assert_eq!(out.data_driver, DataDriver::Slave);
        assert_eq!(out.data.get(), Some(0xDEAD_BEEF));
        assert!(out.acknowledging());
        assert!(out.buffers.data_dir_out);
        assert!(!out.buffers.addr_dir_out);
    }

    #[test]
    fn master_write_drive() {
        let master = MasterDrive {
            address: Some(0x0000_1000),
            control: Some(ControlLines::default()),
            data: Some(7),
        };
        let arbiter = ArbiterDrive {
            bus_request: false,
            bus_in_use: true,
        };
        let out = resolve(&SlaveDrive::default(), &master, &arbiter);
        assert_eq!(out.data_driver, DataDriver::Master);
        assert_eq!(out.address.get(), Some(0x0000_1000));
        assert!(out.claiming_bus() && !out.requesting_bus());
        assert!(out.buffers.data_dir_out && out.buffers.addr_dir_out);
        assert!(!out.any_acknowledge());
    }
}
