//! Synchronizer bank: every slot input crosses into the system clock here.
//!
//! Each pad gets its own two-stage [`Synchronizer`], reset to the level the
//! line rests at. Downstream logic only ever sees the [`BusSnapshot`], which is
//! built from the second stages and already translated from electrical levels
//! to logical "asserted" booleans.

use crate::decode::TransferSize;
use crate::pads::PdsInputs;
use pds_core::signal::Synchronizer;
use serde::{Deserialize, Serialize};

/// Synchronized, logical view of the slot for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSnapshot {
    pub address: u32,
    pub data: u32,
    /// /AS asserted
    pub address_strobe: bool,
    /// /DS asserted
    pub data_strobe: bool,
    /// R/W high
    pub read: bool,
    pub size: TransferSize,
    /// /DSACK0, /DSACK1 asserted
    pub dsack: [bool; 2],
    /// /BG asserted
    pub bus_grant: bool,
    /// /BGACK asserted (some master holds the bus)
    pub bus_busy: bool,
}

impl BusSnapshot {
    pub fn any_dsack(&self) -> bool {
        self.dsack[0] || self.dsack[1]
    }

    /// No cycle in flight and nobody claiming ownership.
    pub fn bus_quiet(&self) -> bool {
        !self.address_strobe && !self.any_dsack() && !self.bus_busy
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchronizerBank {
    address: Synchronizer<u32>,
    data: Synchronizer<u32>,
    as_n: Synchronizer<bool>,
    ds_n: Synchronizer<bool>,
    rw: Synchronizer<bool>,
    siz0: Synchronizer<bool>,
    siz1: Synchronizer<bool>,
    dsack0_n: Synchronizer<bool>,
    dsack1_n: Synchronizer<bool>,
    bg_n: Synchronizer<bool>,
    bgack_n: Synchronizer<bool>,
}

impl Default for SynchronizerBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SynchronizerBank {
    pub fn new() -> Self {
        let idle = PdsInputs::default();
        Self {
            address: Synchronizer::new(idle.address),
            data: Synchronizer::new(idle.data),
            as_n: Synchronizer::new(idle.as_n),
            ds_n: Synchronizer::new(idle.ds_n),
            rw: Synchronizer::new(idle.rw),
            siz0: Synchronizer::new(idle.siz0),
            siz1: Synchronizer::new(idle.siz1),
            dsack0_n: Synchronizer::new(idle.dsack0_n),
            dsack1_n: Synchronizer::new(idle.dsack1_n),
            bg_n: Synchronizer::new(idle.bg_n),
            bgack_n: Synchronizer::new(idle.bgack_n),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Clock edge: sample every pad.
    pub fn clock(&mut self, pads: &PdsInputs) {
        self.address.clock(pads.address);
        self.data.clock(pads.data);
        self.as_n.clock(pads.as_n);
        self.ds_n.clock(pads.ds_n);
        self.rw.clock(pads.rw);
        self.siz0.clock(pads.siz0);
        self.siz1.clock(pads.siz1);
        self.dsack0_n.clock(pads.dsack0_n);
        self.dsack1_n.clock(pads.dsack1_n);
        self.bg_n.clock(pads.bg_n);
        self.bgack_n.clock(pads.bgack_n);
    }

    pub fn snapshot(&self) -> BusSnapshot {
        BusSnapshot {
            address: self.address.get(),
            data: self.data.get(),
            address_strobe: !self.as_n.get(),
            data_strobe: !self.ds_n.get(),
            read: self.rw.get(),
            size: TransferSize::from_lines(self.siz1.get(), self.siz0.get()),
            dsack: [!self.dsack0_n.get(), !self.dsack1_n.get()],
            bus_grant: !self.bg_n.get(),
            bus_busy: !self.bgack_n.get(),
        }
    }
}
