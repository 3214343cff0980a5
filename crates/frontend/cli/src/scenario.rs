//! Scripted bus scenarios run by `pds-trace`.

use clap::ValueEnum;
use log::debug;
use pds_se30::testbench::{DmaResult, HostCycle, Testbench};
use pds_se30::TransferSize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Host CPU reads from the slot
    Read,
    /// Host CPU writes to the slot
    Write,
    /// Bridge reads from the slot as bus master
    DmaRead,
    /// Bridge writes to the slot as bus master
    DmaWrite,
    /// Host CPU starts a read and withdraws /AS before it completes
    Abort,
}

impl Scenario {
    pub fn default_address(self) -> u32 {
        match self {
            Scenario::Read | Scenario::Write | Scenario::Abort => 0xF900_0000,
            Scenario::DmaRead | Scenario::DmaWrite => 0x0000_1000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Host {
        write: bool,
        address: u32,
        cycle: HostCycle,
    },
    Dma {
        write: bool,
        address: u32,
        result: DmaResult,
    },
    Abort {
        interrupted: &'static str,
        idle_after: Option<u32>,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Host {
                write,
                address,
                cycle,
            } => {
                let kind = if *write { "write" } else { "read" };
                if !cycle.acknowledged {
                    return write!(f, "host {kind} {address:08X}: no /DSACK");
                }
                write!(
                    f,
                    "host {kind} {address:08X}: /DSACK after {} tick(s), released {} tick(s) after /AS",
                    cycle.ack_after, cycle.release_after
                )?;
                if !*write {
                    write!(f, ", data {:08X}", cycle.data)?;
                }
                Ok(())
            }
            Outcome::Dma {
                write,
                address,
                result,
            } => {
                let kind = if *write { "write" } else { "read" };
                if result.err {
                    write!(f, "dma {kind} {address:08X}: error after {} tick(s)", result.ticks)
                } else if !result.ack {
                    write!(f, "dma {kind} {address:08X}: still waiting after {} tick(s)", result.ticks)
                } else if *write {
                    write!(f, "dma {kind} {address:08X}: ack after {} tick(s)", result.ticks)
                } else {
                    write!(
                        f,
                        "dma {kind} {address:08X}: ack after {} tick(s), data {:08X}",
                        result.ticks, result.data
                    )
                }
            }
            Outcome::Abort {
                interrupted,
                idle_after,
            } => match idle_after {
                Some(ticks) => write!(
                    f,
                    "abort in {interrupted}: responder idle {ticks} tick(s) after /AS withdrawn"
                ),
                None => write!(f, "abort in {interrupted}: responder did not return to IDLE"),
            },
        }
    }
}

pub struct Request {
    pub scenario: Scenario,
    pub address: u32,
    pub data: u32,
    pub size: TransferSize,
    pub max_ticks: u32,
}

pub fn run(bench: &mut Testbench, request: &Request) -> Outcome {
    let Request {
        scenario,
        address,
        data,
        size,
        max_ticks,
    } = *request;
    debug!("running {:?} at {:08X}", scenario, address);

    match scenario {
        Scenario::Read => {
            bench.memory.poke(address, data);
            Outcome::Host {
                write: false,
                address,
                cycle: bench.host_read(address, size, max_ticks),
            }
        }
        Scenario::Write => Outcome::Host {
            write: true,
            address,
            cycle: bench.host_write(address, size, data, max_ticks),
        },
        Scenario::DmaRead => {
            bench.target.poke(address, data);
            Outcome::Dma {
                write: false,
                address,
                result: bench.dma(address, None, max_ticks),
            }
        }
        Scenario::DmaWrite => Outcome::Dma {
            write: true,
            address,
            result: bench.dma(address, Some(data), max_ticks),
        },
        Scenario::Abort => run_abort(bench, address, size, max_ticks),
    }
}

fn run_abort(bench: &mut Testbench, address: u32, size: TransferSize, max_ticks: u32) -> Outcome {
    // Memory that never answers in time, so the cycle is caught mid-flight.
    bench.memory.latency = u32::MAX;
    bench.host_address(address, true, size);
    bench.step();
    bench.host.as_n = false;
    bench.host.ds_n = false;

    for _ in 0..max_ticks {
        bench.step();
        if bench.bridge.slave_state().name() != "IDLE" {
            break;
        }
    }
    let interrupted = bench.bridge.slave_state().name();

    bench.host.as_n = true;
    bench.host.ds_n = true;
    let idle_after = (1..=max_ticks).find(|_| {
        bench.step();
        bench.bridge.slave_state().name() == "IDLE"
    });

    Outcome::Abort {
        interrupted,
        idle_after,
    }
}
