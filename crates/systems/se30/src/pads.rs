//! Processor Direct Slot pads.
//!
//! [`PdsInputs`] is what the pins read back this instant: raw electrical
//! levels, not yet synchronized. Active-low lines carry an `_n` suffix and are
//! `true` when the wire is high (negated). R/W is high for a read.
//!
//! [`PdsOutputs`] is what the bridge drives: one [`TriState`] per line or line
//! group plus the external transceiver controls. The control group (/AS, /DS,
//! R/W, SIZ1:0) shares one enable, as it shares one buffer on the board.

use crate::decode::TransferSize;
use pds_core::signal::TriState;
use serde::{Deserialize, Serialize};

/// Raw pad levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdsInputs {
    pub address: u32,
    pub data: u32,
    pub as_n: bool,
    pub ds_n: bool,
    pub rw: bool,
    pub siz0: bool,
    pub siz1: bool,
    pub dsack0_n: bool,
    pub dsack1_n: bool,
    pub bg_n: bool,
    pub bgack_n: bool,
}

impl Default for PdsInputs {
    /// A quiet bus: every strobe and handshake negated, read, long-word size.
    fn default() -> Self {
        Self {
            address: 0,
            data: 0,
            as_n: true,
            ds_n: true,
            rw: true,
            siz0: false,
            siz1: false,
            dsack0_n: true,
            dsack1_n: true,
            bg_n: true,
            bgack_n: true,
        }
    }
}

impl PdsInputs {
    pub fn size(&self) -> TransferSize {
        TransferSize::from_lines(self.siz1, self.siz0)
    }

    pub fn set_size(&mut self, size: TransferSize) {
        let (siz1, siz0) = size.lines();
        self.siz1 = siz1;
        self.siz0 = siz0;
    }

    /// Levels seen on the pins when the rest of the bus drives `self` and the
    /// bridge drives `ours`.
    ///
    /// Three-state lines take the bridge's value while it is enabled. The
    /// open-collector lines (/DSACKx, /BGACK) resolve as a wired AND.
    pub fn with_bridge(&self, ours: &PdsOutputs) -> PdsInputs {
        let mut pads = *self;
        if let Some(address) = ours.address.get() {
            pads.address = address;
        }
        if let Some(data) = ours.data.get() {
            pads.data = data;
        }
        if let Some(control) = ours.control.get() {
            pads.as_n = control.as_n;
            pads.ds_n = control.ds_n;
            pads.rw = control.rw;
            pads.set_size(control.size);
        }
        pads.dsack0_n = ours.dsack0_n.wired_and(self.dsack0_n);
        pads.dsack1_n = ours.dsack1_n.wired_and(self.dsack1_n);
        pads.bgack_n = ours.bgack_n.wired_and(self.bgack_n);
        pads
    }
}

/// Levels of the control group while the bridge masters the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlLines {
    pub as_n: bool,
    pub ds_n: bool,
    pub rw: bool,
    pub size: TransferSize,
}

impl Default for ControlLines {
    fn default() -> Self {
        Self {
            as_n: true,
            ds_n: true,
            rw: true,
            size: TransferSize::Long,
        }
    }
}

/// External transceiver controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferControl {
    /// Data transceiver points outward
    pub data_dir_out: bool,
    /// Address and control transceivers point outward
    pub addr_dir_out: bool,
    /// Active-low transceiver enable
    pub enable_n: bool,
}

impl Default for BufferControl {
    fn default() -> Self {
        Self {
            data_dir_out: false,
            addr_dir_out: false,
            enable_n: true,
        }
    }
}

/// Which logical driver owns the data bus this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataDriver {
    #[default]
    None,
    Slave,
    Master,
}

/// Everything the bridge drives onto the slot for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PdsOutputs {
    pub address: TriState<u32>,
    pub data: TriState<u32>,
    pub control: TriState<ControlLines>,
    pub dsack0_n: TriState<bool>,
    pub dsack1_n: TriState<bool>,
    pub br_n: TriState<bool>,
    pub bgack_n: TriState<bool>,
    pub data_driver: DataDriver,
    pub buffers: BufferControl,
}

impl PdsOutputs {
    /// Both /DSACK lines pulled low (32-bit port acknowledge).
    pub fn acknowledging(&self) -> bool {
        self.dsack0_n.get() == Some(false) && self.dsack1_n.get() == Some(false)
    }

    /// Either /DSACK line pulled low.
    pub fn any_acknowledge(&self) -> bool {
        self.dsack0_n.get() == Some(false) || self.dsack1_n.get() == Some(false)
    }

    pub fn requesting_bus(&self) -> bool {
        self.br_n.get() == Some(false)
    }

    pub fn claiming_bus(&self) -> bool {
        self.bgack_n.get() == Some(false)
    }

    /// /AS asserted by the bridge.
    pub fn address_strobe(&self) -> bool {
        self.control.get().is_some_and(|c| !c.as_n)
    }

    /// /DS asserted by the bridge.
    pub fn data_strobe(&self) -> bool {
        self.control.get().is_some_and(|c| !c.ds_n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_pads_are_negated() {
        let pads = PdsInputs::default();
        assert!(pads.as_n && pads.ds_n && pads.dsack0_n && pads.dsack1_n);
        assert!(pads.bg_n && pads.bgack_n);
        assert_eq!(pads.size(), TransferSize::Long);
    }

    #[test]
    fn released_bridge_leaves_bus_alone() {
        let mut bus = PdsInputs::default();
        bus.address = 0xF900_0010;
        bus.as_n = false;
        let seen = bus.with_bridge(&PdsOutputs::default());
        assert_eq!(seen, bus);
    }

    #[test]
    fn bridge_drive_overrides_three_state_lines() {
        let bus = PdsInputs::default();
        let ours = PdsOutputs {
            address: TriState::driven(0x0000_1000),
            data: TriState::driven(0x1234_5678),
            control: TriState::driven(ControlLines {
                as_n: false,
                ds_n: false,
                rw: false,
                size: TransferSize::Word,
            }),
            ..PdsOutputs::default()
        };
        let seen = bus.with_bridge(&ours);
        assert_eq!(seen.address, 0x0000_1000);
        assert_eq!(seen.data, 0x1234_5678);
        assert!(!seen.as_n && !seen.ds_n && !seen.rw);
        assert_eq!(seen.size(), TransferSize::Word);
    }

    #[test]
    fn open_collector_lines_wire_and() {
        let mut bus = PdsInputs::default();
        let ours = PdsOutputs {
            dsack0_n: TriState::pull_low(),
            ..PdsOutputs::default()
        };
        let seen = bus.with_bridge(&ours);
        assert!(!seen.dsack0_n);
        assert!(seen.dsack1_n);

        bus.dsack1_n = false;
        assert!(!bus.with_bridge(&PdsOutputs::default()).dsack1_n);
    }
}
