//! Cycle-level model of the slot around a [`Se30Bridge`].
//!
//! The bench plays every other party on the wires: a scripted 68030 host that
//! runs cycles and grants the bus, a [`ScratchMemory`] answering the bridge's
//! internal read and write ports, and a [`SlotTarget`] that answers the
//! bridge's own DMA cycles on the slot. Pads are resolved against the bridge's
//! drive every tick through [`PdsInputs::with_bridge`], so the bridge samples
//! its own /AS and /DSACK the way it would on hardware.
//!
//! Used by the integration tests and the `pds-trace` tool.

use crate::decode::TransferSize;
use crate::pads::{PdsInputs, PdsOutputs};
use crate::{DebugProbe, InternalBus, Se30Bridge};
use pds_core::types::Tick;
use pds_core::wishbone::{merge_lanes, Wishbone};
use serde::Serialize;
use std::collections::BTreeMap;

/// One access served on an internal port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Access {
    pub tick: Tick,
    pub write: bool,
    /// Byte address of the word
    pub address: u32,
    pub sel: u8,
    /// Written data, or data returned for a read
    pub data: u32,
}

/// Word-addressed memory behind the bridge's `read` and `write` ports.
///
/// Answers each request after `latency` extra ticks with a one-tick `ack`.
#[derive(Debug, Clone, Default)]
pub struct ScratchMemory {
    words: BTreeMap<u32, u32>,
    pub latency: u32,
    read_waited: u32,
    write_waited: u32,
    pub accesses: Vec<Access>,
}

impl ScratchMemory {
    pub fn new(latency: u32) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn peek(&self, address: u32) -> u32 {
        self.words.get(&(address >> 2)).copied().unwrap_or(0)
    }

    pub fn poke(&mut self, address: u32, value: u32) {
        self.words.insert(address >> 2, value);
    }

    fn serve(&mut self, port: &mut Wishbone, tick: Tick, write: bool) {
        let waited = if write {
            &mut self.write_waited
        } else {
            &mut self.read_waited
        };

        if !port.requesting() || port.ack {
            port.ack = false;
            *waited = 0;
            return;
        }
        if *waited < self.latency {
            *waited += 1;
            return;
        }
        *waited = 0;

        let word = self.words.get(&port.adr).copied().unwrap_or(0);
        let data = if write {
            let merged = merge_lanes(word, port.dat_w, port.sel);
            self.words.insert(port.adr, merged);
            port.dat_w
        } else {
            port.dat_r = word;
            word
        };
        port.ack = true;
        self.accesses.push(Access {
            tick,
            write,
            address: port.byte_address(),
            sel: port.sel,
            data,
        });
    }
}

/// A 32-bit port on the slot that answers cycles the bridge masters.
#[derive(Debug, Clone)]
pub struct SlotTarget {
    words: BTreeMap<u32, u32>,
    /// Ticks between seeing /AS and pulling /DSACK
    pub latency: u32,
    /// A disabled target never acknowledges
    pub enabled: bool,
    /// Which of /DSACK0, /DSACK1 the target pulls
    pub dsack: [bool; 2],
    /// Ticks /DSACK stays asserted after /AS is negated
    pub release_delay: u32,
    waited: u32,
    held: u32,
    acknowledged: bool,
}

impl Default for SlotTarget {
    fn default() -> Self {
        Self {
            words: BTreeMap::new(),
            latency: 1,
            enabled: true,
            dsack: [true, true],
            release_delay: 0,
            waited: 0,
            held: 0,
            acknowledged: false,
        }
    }
}

impl SlotTarget {
    pub fn peek(&self, address: u32) -> u32 {
        self.words.get(&(address >> 2)).copied().unwrap_or(0)
    }

    pub fn poke(&mut self, address: u32, value: u32) {
        self.words.insert(address >> 2, value);
    }

    /// Update what the target drives next tick, given this tick's pads.
    fn clock(&mut self, pads: &PdsInputs, ours: &PdsOutputs, host: &mut PdsInputs) {
        if !ours.address_strobe() {
            self.waited = 0;
            if self.acknowledged && self.held < self.release_delay {
                self.held += 1;
                return;
            }
            self.held = 0;
            self.acknowledged = false;
            host.dsack0_n = true;
            host.dsack1_n = true;
            return;
        }
        if !self.enabled || self.acknowledged {
            return;
        }
        self.waited += 1;
        if self.waited < self.latency {
            return;
        }

        if pads.rw {
            host.data = self.peek(pads.address);
        } else {
            self.poke(pads.address, pads.data);
        }
        host.dsack0_n = !self.dsack[0];
        host.dsack1_n = !self.dsack[1];
        self.acknowledged = true;
    }
}

/// One tick as seen from outside the bridge.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TickRecord {
    /// Bridge state going into the tick
    pub probe: DebugProbe,
    /// Resolved pin levels during the tick
    pub pads: PdsInputs,
    pub outputs: PdsOutputs,
    /// Internal links as the bridge left them
    pub bus: InternalBus,
}

impl TickRecord {
    pub fn slave_busy(&self) -> bool {
        self.probe.slave != "IDLE"
    }

    pub fn master_busy(&self) -> bool {
        self.probe.master != "IDLE"
    }
}

/// Outcome of a host cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostCycle {
    pub acknowledged: bool,
    /// Data bus sampled with /DSACK (reads)
    pub data: u32,
    /// Ticks from /AS assertion to the first tick /DSACK was seen
    pub ack_after: u32,
    /// Ticks from /AS negation to the first tick /DSACK was released
    pub release_after: u32,
}

/// Outcome of a DMA transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DmaResult {
    pub ack: bool,
    pub err: bool,
    pub data: u32,
    /// Ticks from posting the request to `ack` or `err`
    pub ticks: u32,
}

pub struct Testbench {
    pub bridge: Se30Bridge,
    pub bus: InternalBus,
    /// What the rest of the slot drives
    pub host: PdsInputs,
    pub memory: ScratchMemory,
    pub target: SlotTarget,
    /// Ticks the host waits on /BR before asserting /BG; `None` never grants
    pub grant_delay: Option<u32>,
    grant_waited: u32,
    pub history: Vec<TickRecord>,
}

impl Testbench {
    pub fn new(bridge: Se30Bridge) -> Self {
        Self {
            bridge,
            bus: InternalBus::default(),
            host: PdsInputs::default(),
            memory: ScratchMemory::new(0),
            target: SlotTarget::default(),
            grant_delay: Some(0),
            grant_waited: 0,
            history: Vec::new(),
        }
    }

    pub fn last(&self) -> Option<&TickRecord> {
        self.history.last()
    }

    /// Advance one tick.
    pub fn step(&mut self) -> PdsOutputs {
        let probe = self.bridge.probe();
        let host = self.host;
        let outputs = self
            .bridge
            .tick_with(&mut self.bus, |ours| host.with_bridge(ours));
        let pads = host.with_bridge(&outputs);
        let tick = self.bridge.ticks();

        self.history.push(TickRecord {
            probe,
            pads,
            outputs,
            bus: self.bus,
        });

        self.memory.serve(&mut self.bus.read, tick, false);
        self.memory.serve(&mut self.bus.write, tick, true);
        self.target.clock(&pads, &outputs, &mut self.host);
        self.arbitrate(&outputs);

        outputs
    }

    pub fn run(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Host side of /BR, /BG, /BGACK: grant after the configured delay and
    /// negate /BG once /BGACK is asserted.
    fn arbitrate(&mut self, ours: &PdsOutputs) {
        if ours.claiming_bus() || !ours.requesting_bus() {
            self.host.bg_n = true;
            self.grant_waited = 0;
            return;
        }
        match self.grant_delay {
            Some(delay) if self.grant_waited >= delay => self.host.bg_n = false,
            Some(_) => self.grant_waited += 1,
            None => {}
        }
    }

    /// Put the host's address phase on the bus.
    pub fn host_address(&mut self, address: u32, read: bool, size: TransferSize) {
        self.host.address = address;
        self.host.rw = read;
        self.host.set_size(size);
    }

    /// Run a host read, giving up after `max_ticks` without /DSACK.
    pub fn host_read(&mut self, address: u32, size: TransferSize, max_ticks: u32) -> HostCycle {
        self.host_address(address, true, size);
        self.step();
        self.host.as_n = false;
        self.host.ds_n = false;
        self.finish_host_cycle(max_ticks)
    }

    /// Run a host write. /DS and the data follow /AS by one tick.
    pub fn host_write(
        &mut self,
        address: u32,
        size: TransferSize,
        data: u32,
        max_ticks: u32,
    ) -> HostCycle {
        self.host_address(address, false, size);
        self.step();
        self.host.as_n = false;
        self.step();
        self.host.data = data;
        self.host.ds_n = false;
        let mut cycle = self.finish_host_cycle(max_ticks);
        cycle.ack_after += 1;
        cycle
    }

    /// Wait for /DSACK, then end the cycle and wait for /DSACK to go away.
    fn finish_host_cycle(&mut self, max_ticks: u32) -> HostCycle {
        let mut cycle = HostCycle {
            acknowledged: false,
            data: 0,
            ack_after: 0,
            release_after: 0,
        };

        for n in 1..=max_ticks {
            let outputs = self.step();
            if outputs.any_acknowledge() {
                cycle.acknowledged = true;
                cycle.ack_after = n;
                cycle.data = self.host.with_bridge(&outputs).data;
                break;
            }
        }

        self.host.as_n = true;
        self.host.ds_n = true;
        self.host.rw = true;
        for n in 1..=max_ticks.max(4) {
            if !self.step().any_acknowledge() {
                cycle.release_after = n;
                break;
            }
        }
        cycle
    }

    /// Post a DMA request and run until it completes or `max_ticks` pass.
    /// The request is withdrawn the tick after `ack` or `err`.
    pub fn dma(&mut self, address: u32, write: Option<u32>, max_ticks: u32) -> DmaResult {
        match write {
            Some(data) => self.bus.dma.drive_write(address >> 2, 0b1111, data),
            None => self.bus.dma.drive_read(address >> 2, 0b1111),
        }

        let mut result = DmaResult {
            ack: false,
            err: false,
            data: 0,
            ticks: max_ticks,
        };
        for n in 1..=max_ticks {
            self.step();
            if self.bus.dma.ack || self.bus.dma.err {
                result = DmaResult {
                    ack: self.bus.dma.ack,
                    err: self.bus.dma.err,
                    data: self.bus.dma.dat_r,
                    ticks: n,
                };
                break;
            }
        }
        self.bus.dma.release();
        result
    }
}
