//! Slave responder: the host CPU reads or writes a resource behind the bridge.
//!
//! ```text
//!            start & read                ack
//!   IDLE ───────────────▶ READ_REQUEST ──────▶ READ_DRIVE ──┐
//!    ▲  │                                                    │ /AS negated
//!    │  │ start & write           /DS        ack             │
//!    │  └──────────────▶ WRITE_WAIT_DATA ─▶ WRITE_REQUEST ─▶ WRITE_ACK
//!    │                                                       │
//!    └──────────────── /AS negated from any state ◀──────────┘
//! ```
//!
//! The responder always answers as a 32-bit port, pulling both /DSACK lines
//! low whatever the requested size; the CPU's dynamic bus sizing takes care
//! of the rest. An external abort (/AS negated before completion) drops any
//! internal request in the same tick and never leaves /DSACK asserted.

use crate::decode::ByteLanes;
use crate::sync_bank::BusSnapshot;
use pds_core::logging::{log, LogCategory, LogLevel};
use pds_core::wishbone::Wishbone;
use serde::{Deserialize, Serialize};

/// Address phase latched when a slave cycle starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveCycle {
    pub address: u32,
    pub read: bool,
    pub lanes: ByteLanes,
}

impl SlaveCycle {
    /// Internal bus word address.
    pub fn word_address(&self) -> u32 {
        self.address >> 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SlaveState {
    #[default]
    Idle,
    ReadRequest(SlaveCycle),
    ReadDrive { cycle: SlaveCycle, data: u32 },
    WriteWaitData(SlaveCycle),
    WriteRequest(SlaveCycle),
    WriteAck(SlaveCycle),
}

impl SlaveState {
    pub fn name(&self) -> &'static str {
        match self {
            SlaveState::Idle => "IDLE",
            SlaveState::ReadRequest(_) => "READ_REQUEST",
            SlaveState::ReadDrive { .. } => "READ_DRIVE",
            SlaveState::WriteWaitData(_) => "WRITE_WAIT_DATA",
            SlaveState::WriteRequest(_) => "WRITE_REQUEST",
            SlaveState::WriteAck(_) => "WRITE_ACK",
        }
    }

    pub fn cycle(&self) -> Option<&SlaveCycle> {
        match self {
            SlaveState::Idle => None,
            SlaveState::ReadRequest(cycle)
            | SlaveState::ReadDrive { cycle, .. }
            | SlaveState::WriteWaitData(cycle)
            | SlaveState::WriteRequest(cycle)
            | SlaveState::WriteAck(cycle) => Some(cycle),
        }
    }
}

/// What the responder wants on the slot this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlaveDrive {
    pub data: Option<u32>,
    pub acknowledge: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveResponder {
    state: SlaveState,
}

impl SlaveResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.state = SlaveState::Idle;
    }

    pub fn state(&self) -> &SlaveState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SlaveState::Idle
    }

    /// One tick. `start` carries the latched address phase on the tick a
    /// selected cycle begins.
    ///
    /// Drives the internal request ports and returns the slot drive for the
    /// current state; the next state takes effect on return.
    pub fn step(
        &mut self,
        start: Option<SlaveCycle>,
        snap: &BusSnapshot,
        read_port: &mut Wishbone,
        write_port: &mut Wishbone,
    ) -> SlaveDrive {
        read_port.release();
        write_port.release();

        let aborted = !snap.address_strobe;
        let mut drive = SlaveDrive::default();

        let next = match self.state {
            SlaveState::Idle => match start {
                Some(cycle) if cycle.read => {
                    log(LogCategory::Slave, LogLevel::Debug, || {
                        format!(
                            "slave: read {:08X} lanes {:04b}",
                            cycle.address,
                            cycle.lanes.bits()
                        )
                    });
                    SlaveState::ReadRequest(cycle)
                }
                Some(cycle) => {
                    log(LogCategory::Slave, LogLevel::Debug, || {
                        format!(
                            "slave: write {:08X} lanes {:04b}",
                            cycle.address,
                            cycle.lanes.bits()
                        )
                    });
                    SlaveState::WriteWaitData(cycle)
                }
                None => SlaveState::Idle,
            },

            SlaveState::ReadRequest(cycle) => {
                read_port.drive_read(cycle.word_address(), cycle.lanes.bits());
                if aborted {
                    self.log_abort();
                    SlaveState::Idle
                } else if read_port.ack {
                    SlaveState::ReadDrive {
                        cycle,
                        data: read_port.dat_r,
                    }
                } else {
                    self.state
                }
            }

            SlaveState::ReadDrive { data, .. } => {
                drive.data = Some(data);
                drive.acknowledge = true;
                if aborted {
                    SlaveState::Idle
                } else {
                    self.state
                }
            }

            SlaveState::WriteWaitData(cycle) => {
                if aborted {
                    self.log_abort();
                    SlaveState::Idle
                } else if snap.data_strobe {
                    SlaveState::WriteRequest(cycle)
                } else {
                    self.state
                }
            }

            SlaveState::WriteRequest(cycle) => {
                write_port.drive_write(cycle.word_address(), cycle.lanes.bits(), snap.data);
                if aborted {
                    self.log_abort();
                    SlaveState::Idle
                } else if write_port.ack {
                    log(LogCategory::InternalBus, LogLevel::Trace, || {
                        format!("slave: wrote {:08X} <- {:08X}", cycle.address, snap.data)
                    });
                    SlaveState::WriteAck(cycle)
                } else {
                    self.state
                }
            }

            SlaveState::WriteAck(_) => {
                drive.acknowledge = true;
                if aborted {
                    SlaveState::Idle
                } else {
                    self.state
                }
            }
        };

        self.state = next;
        drive
    }

    fn log_abort(&self) {
        log(LogCategory::Slave, LogLevel::Debug, || {
            format!("slave: /AS negated in {}, cycle dropped", self.state.name())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::TransferSize;

    fn snapshot(address_strobe: bool, data_strobe: bool, data: u32) -> BusSnapshot {
        BusSnapshot {
            address: 0xF900_0010,
            data,
            address_strobe,
            data_strobe,
            read: true,
            size: TransferSize::Long,
            dsack: [false, false],
            bus_grant: false,
            bus_busy: false,
        }
    }

    fn cycle(read: bool) -> SlaveCycle {
        SlaveCycle {
            address: 0xF900_0010,
            read,
            lanes: ByteLanes::ALL,
        }
    }

    #[test]
    fn read_path() {
        let mut slave = SlaveResponder::new();
        let (mut rd, mut wr) = (Wishbone::new(), Wishbone::new());
        let live = snapshot(true, false, 0);

        let drive = slave.step(Some(cycle(true)), &live, &mut rd, &mut wr);
        assert_eq!(drive, SlaveDrive::default());
        assert!(!rd.requesting(), "request starts the tick after the edge");
        assert_eq!(slave.state().name(), "READ_REQUEST");

        slave.step(None, &live, &mut rd, &mut wr);
        assert!(rd.requesting());
        assert!(!rd.we);
        assert_eq!(rd.adr, 0xF900_0010 >> 2);
        assert_eq!(rd.sel, 0b1111);

        rd.ack = true;
        rd.dat_r = 0xDEAD_BEEF;
        slave.step(None, &live, &mut rd, &mut wr);
        rd.ack = false;

        let drive = slave.step(None, &live, &mut rd, &mut wr);
        assert!(!rd.requesting());
        assert_eq!(drive.data, Some(0xDEAD_BEEF));
        assert!(drive.acknowledge);

        let drive = slave.step(None, &snapshot(false, false, 0), &mut rd, &mut wr);
        assert!(drive.acknowledge, "held through the tick /AS is seen negated");
        assert!(slave.is_idle());
    }

    #[test]
    fn write_waits_for_data_strobe() {
        let mut slave = SlaveResponder::new();
        let (mut rd, mut wr) = (Wishbone::new(), Wishbone::new());

        slave.step(Some(cycle(false)), &snapshot(true, false, 0), &mut rd, &mut wr);
        for _ in 0..3 {
            slave.step(None, &snapshot(true, false, 0), &mut rd, &mut wr);
            assert!(!wr.requesting());
        }
        slave.step(None, &snapshot(true, true, 0xCAFE_BABE), &mut rd, &mut wr);
        assert_eq!(slave.state().name(), "WRITE_REQUEST");

        let drive = slave.step(None, &snapshot(true, true, 0xCAFE_BABE), &mut rd, &mut wr);
        assert!(!drive.acknowledge);
        assert!(wr.requesting() && wr.we);
        assert_eq!(wr.dat_w, 0xCAFE_BABE);

        wr.ack = true;
        slave.step(None, &snapshot(true, true, 0xCAFE_BABE), &mut rd, &mut wr);
        wr.ack = false;
        let drive = slave.step(None, &snapshot(true, true, 0xCAFE_BABE), &mut rd, &mut wr);
        assert!(drive.acknowledge);
        assert_eq!(drive.data, None);
    }

    #[test]
    fn abort_from_every_busy_state() {
        let busy = [
            SlaveState::ReadRequest(cycle(true)),
            SlaveState::ReadDrive {
                cycle: cycle(true),
                data: 1,
            },
            SlaveState::WriteWaitData(cycle(false)),
            SlaveState::WriteRequest(cycle(false)),
            SlaveState::WriteAck(cycle(false)),
        ];
        for state in busy {
            let mut slave = SlaveResponder { state };
            let (mut rd, mut wr) = (Wishbone::new(), Wishbone::new());
            rd.ack = true;
            wr.ack = true;
            slave.step(None, &snapshot(false, true, 0), &mut rd, &mut wr);
            assert!(slave.is_idle(), "{} did not unwind", state.name());

            let drive = slave.step(None, &snapshot(false, false, 0), &mut rd, &mut wr);
            assert!(!drive.acknowledge);
            assert!(!rd.requesting() && !wr.requesting());
        }
    }
}
