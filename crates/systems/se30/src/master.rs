//! Master transfer engine: runs one DMA transfer on the slot once the
//! arbiter holds the bus.
//!
//! ```text
//!   IDLE ──▶ DRIVE_ADDRESS ──▶ ASSERT_STROBES ──▶ WAIT_ACK ──▶ COMPLETE ──▶ IDLE
//!                                                   │  ▲
//!                                                   └──┘ no /DSACK yet
//! ```
//!
//! Address, R/W and SIZ go out one tick before /AS and /DS so the strobes
//! never precede a stable address. Transfers are always long-word sized.
//! Either /DSACK line completes the cycle. If neither arrives within the
//! configured timeout the DMA port sees `err` instead of `ack`. A new transfer
//! starts only after /DSACK from the previous one has been released.

use crate::decode::TransferSize;
use crate::pads::ControlLines;
use crate::sync_bank::BusSnapshot;
use pds_core::logging::{log, LogCategory, LogLevel};
use pds_core::wishbone::Wishbone;
use serde::{Deserialize, Serialize};

/// The DMA transfer being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterCycle {
    /// Byte address on the slot
    pub address: u32,
    pub write: bool,
    pub data: u32,
}

impl MasterCycle {
    fn from_port(port: &Wishbone) -> Self {
        Self {
            address: port.byte_address(),
            write: port.we,
            data: port.dat_w,
        }
    }

    fn control(&self, strobes: bool) -> ControlLines {
        ControlLines {
            as_n: !strobes,
            ds_n: !strobes,
            rw: !self.write,
            size: TransferSize::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MasterState {
    #[default]
    Idle,
    DriveAddress(MasterCycle),
    AssertStrobes(MasterCycle),
    WaitAck { cycle: MasterCycle, waited: u32 },
    Complete(MasterCycle),
}

impl MasterState {
    pub fn name(&self) -> &'static str {
        match self {
            MasterState::Idle => "IDLE",
            MasterState::DriveAddress(_) => "DRIVE_ADDRESS",
            MasterState::AssertStrobes(_) => "ASSERT_STROBES",
            MasterState::WaitAck { .. } => "WAIT_ACK",
            MasterState::Complete(_) => "COMPLETE",
        }
    }
}

/// What the engine wants on the slot this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MasterDrive {
    pub address: Option<u32>,
    pub control: Option<ControlLines>,
    pub data: Option<u32>,
}

impl MasterDrive {
    fn for_cycle(cycle: &MasterCycle, strobes: bool) -> Self {
        Self {
            address: Some(cycle.address),
            control: Some(cycle.control(strobes)),
            data: cycle.write.then_some(cycle.data),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterEngine {
    state: MasterState,
}

impl MasterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.state = MasterState::Idle;
    }

    pub fn state(&self) -> &MasterState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == MasterState::Idle
    }

    /// Between transfers: idle, or finishing one this tick.
    pub fn is_done(&self) -> bool {
        matches!(self.state, MasterState::Idle | MasterState::Complete(_))
    }

    /// One tick. `owned` is the arbiter's ownership token as of this tick.
    ///
    /// Writes `ack`/`err`/`dat_r` on the DMA port and returns the slot drive
    /// for the current state; the next state takes effect on return.
    pub fn step(
        &mut self,
        owned: bool,
        snap: &BusSnapshot,
        dma: &mut Wishbone,
        timeout: Option<u32>,
    ) -> MasterDrive {
        dma.idle_response();

        let (drive, next) = match self.state {
            MasterState::Idle => {
                // A target may still be releasing /DSACK from the last cycle.
                let next = if owned && dma.requesting() && !snap.any_dsack() {
                    let cycle = MasterCycle::from_port(dma);
                    log(LogCategory::Master, LogLevel::Debug, || {
                        format!(
                            "master: {} {:08X}",
                            if cycle.write { "write" } else { "read" },
                            cycle.address
                        )
                    });
                    MasterState::DriveAddress(cycle)
                } else {
                    MasterState::Idle
                };
                (MasterDrive::default(), next)
            }

            MasterState::DriveAddress(cycle) => (
                MasterDrive::for_cycle(&cycle, false),
                MasterState::AssertStrobes(cycle),
            ),

            MasterState::AssertStrobes(cycle) => (
                MasterDrive::for_cycle(&cycle, true),
                MasterState::WaitAck { cycle, waited: 0 },
            ),

            MasterState::WaitAck { cycle, waited } => {
                let drive = MasterDrive::for_cycle(&cycle, true);
                if snap.any_dsack() {
                    if !cycle.write {
                        dma.dat_r = snap.data;
                    }
                    dma.ack = true;
                    log(LogCategory::InternalBus, LogLevel::Trace, || {
                        format!(
                            "master: {:08X} acknowledged after {} tick(s)",
                            cycle.address,
                            waited + 1
                        )
                    });
                    (drive, MasterState::Complete(cycle))
                } else {
                    let waited = waited.saturating_add(1);
                    match timeout {
                        Some(limit) if waited >= limit => {
                            dma.err = true;
                            log(LogCategory::Master, LogLevel::Warn, || {
                                format!(
                                    "master: no /DSACK for {:08X} after {} ticks, reporting error",
                                    cycle.address, waited
                                )
                            });
                            (drive, MasterState::Complete(cycle))
                        }
                        _ => (drive, MasterState::WaitAck { cycle, waited }),
                    }
                }
            }

            MasterState::Complete(cycle) => {
                (MasterDrive::for_cycle(&cycle, false), MasterState::Idle)
            }
        };

        self.state = next;
        drive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(dsack: [bool; 2], data: u32) -> BusSnapshot {
        BusSnapshot {
            address: 0,
            data,
            address_strobe: false,
            data_strobe: false,
            read: true,
            size: TransferSize::Long,
            dsack,
            bus_grant: true,
            bus_busy: false,
        }
    }

    fn dma_read(byte_address: u32) -> Wishbone {
        let mut dma = Wishbone::new();
        dma.drive_read(byte_address >> 2, 0b1111);
        dma
    }

    #[test]
    fn waits_for_ownership() {
        let mut engine = MasterEngine::new();
        let mut dma = dma_read(0x0000_4000);
        let drive = engine.step(false, &snapshot([false; 2], 0), &mut dma, None);
        assert_eq!(drive, MasterDrive::default());
        assert!(engine.is_idle());
    }

    #[test]
    fn waits_for_previous_dsack_release() {
        let mut engine = MasterEngine::new();
        let mut dma = dma_read(0x0000_2000);
        let held = snapshot([true, false], 0x1111_1111);
        for _ in 0..4 {
            let drive = engine.step(true, &held, &mut dma, None);
            assert_eq!(drive, MasterDrive::default());
            assert!(engine.is_idle());
        }
        engine.step(true, &snapshot([false; 2], 0), &mut dma, None);
        assert_eq!(engine.state().name(), "DRIVE_ADDRESS");
    }

    #[test]
    fn read_sequence() {
        let mut engine = MasterEngine::new();
        let mut dma = dma_read(0x0000_4000);
        let quiet = snapshot([false; 2], 0);

        engine.step(true, &quiet, &mut dma, None);
        assert_eq!(engine.state().name(), "DRIVE_ADDRESS");

        let drive = engine.step(true, &quiet, &mut dma, None);
        assert_eq!(drive.address, Some(0x0000_4000));
        let control = drive.control.unwrap();
        assert!(control.as_n && control.ds_n, "strobes wait for address setup");
        assert!(control.rw);
        assert_eq!(control.size, TransferSize::Long);
        assert_eq!(drive.data, None);

        let drive = engine.step(true, &quiet, &mut dma, None);
        let control = drive.control.unwrap();
        assert!(!control.as_n && !control.ds_n);

        for _ in 0..5 {
            engine.step(true, &quiet, &mut dma, None);
            assert!(!dma.ack);
            assert_eq!(engine.state().name(), "WAIT_ACK");
        }

        engine.step(true, &snapshot([false, true], 0x1234_5678), &mut dma, None);
        assert!(dma.ack);
        assert_eq!(dma.dat_r, 0x1234_5678);

        let drive = engine.step(true, &quiet, &mut dma, None);
        assert!(!dma.ack, "ack is a single-tick pulse");
        assert!(drive.control.unwrap().as_n);
        assert!(engine.is_idle());
    }

    #[test]
    fn write_drives_data_from_address_phase() {
        let mut engine = MasterEngine::new();
        let mut dma = Wishbone::new();
        dma.drive_write(0x0000_0100 >> 2, 0b1111, 0xCAFE_BABE);
        let quiet = snapshot([false; 2], 0);

        engine.step(true, &quiet, &mut dma, None);
        let drive = engine.step(true, &quiet, &mut dma, None);
        assert_eq!(drive.data, Some(0xCAFE_BABE));
        assert!(!drive.control.unwrap().rw);

        engine.step(true, &quiet, &mut dma, None);
        engine.step(true, &snapshot([true, true], 0xFFFF_FFFF), &mut dma, None);
        assert!(dma.ack);
        assert_ne!(dma.dat_r, 0xFFFF_FFFF, "writes do not capture the data bus");
    }

    #[test]
    fn timeout_reports_error() {
        let mut engine = MasterEngine::new();
        let mut dma = dma_read(0x0000_0200);
        let quiet = snapshot([false; 2], 0);

        engine.step(true, &quiet, &mut dma, Some(4));
        engine.step(true, &quiet, &mut dma, Some(4));
        engine.step(true, &quiet, &mut dma, Some(4));
        for _ in 0..3 {
            engine.step(true, &quiet, &mut dma, Some(4));
            assert!(!dma.err);
        }
        engine.step(true, &quiet, &mut dma, Some(4));
        assert!(dma.err);
        assert!(!dma.ack);
        assert_eq!(engine.state().name(), "COMPLETE");
    }

    #[test]
    fn no_timeout_stalls_forever() {
        let mut engine = MasterEngine {
            state: MasterState::WaitAck {
                cycle: MasterCycle {
                    address: 0,
                    write: false,
                    data: 0,
                },
                waited: u32::MAX - 1,
            },
        };
        let mut dma = dma_read(0);
        for _ in 0..4 {
            engine.step(true, &snapshot([false; 2], 0), &mut dma, None);
            assert!(!dma.err && !dma.ack);
        }
        assert!(!engine.is_done());
    }
}
