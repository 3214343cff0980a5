//! Bus arbiter: 68030 /BR, /BG, /BGACK ownership handshake for DMA.
//!
//! ```text
//!          dma pending          /BG seen          bus quiet
//!   IDLE ─────────────▶ REQUEST ────────▶ WAIT_FREE ───────▶ OWN
//!    ▲                     │                  │               │
//!    └──── dma withdrawn ──┴──────────────────┘               │
//!    └──────────── dma withdrawn and master engine done ──────┘
//! ```
//!
//! /BR is asserted in `REQUEST` and `WAIT_FREE` and released once /BGACK is
//! driven in `OWN`. "Bus quiet" means /AS, both /DSACK lines and /BGACK are
//! all negated as seen through the synchronizers, and our own slave responder
//! is idle.

use pds_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArbiterState {
    #[default]
    Idle,
    Request,
    WaitFree,
    Own,
}

impl ArbiterState {
    pub fn name(&self) -> &'static str {
        match self {
            ArbiterState::Idle => "IDLE",
            ArbiterState::Request => "REQUEST",
            ArbiterState::WaitFree => "WAIT_FREE",
            ArbiterState::Own => "OWN",
        }
    }
}

/// Conditions sampled by the arbiter each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArbiterInputs {
    /// DMA port holds `cyc && stb`
    pub dma_pending: bool,
    /// Synchronized /BG asserted
    pub bus_grant: bool,
    /// Synchronized /AS, /DSACKx and /BGACK all negated
    pub bus_quiet: bool,
    pub slave_idle: bool,
    /// Master engine is between transfers
    pub master_done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArbiterDrive {
    pub bus_request: bool,
    pub bus_in_use: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusArbiter {
    state: ArbiterState,
}

impl BusArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.state = ArbiterState::Idle;
    }

    pub fn state(&self) -> ArbiterState {
        self.state
    }

    /// Ownership token: true while this device is bus master.
    pub fn owns(&self) -> bool {
        self.state == ArbiterState::Own
    }

    pub fn step(&mut self, inputs: ArbiterInputs) -> ArbiterDrive {
        let drive = match self.state {
            ArbiterState::Idle => ArbiterDrive::default(),
            ArbiterState::Request | ArbiterState::WaitFree => ArbiterDrive {
                bus_request: true,
                bus_in_use: false,
            },
            ArbiterState::Own => ArbiterDrive {
                bus_request: false,
                bus_in_use: true,
            },
        };

        let next = match self.state {
            ArbiterState::Idle if inputs.dma_pending => ArbiterState::Request,
            ArbiterState::Idle => ArbiterState::Idle,
            ArbiterState::Request | ArbiterState::WaitFree if !inputs.dma_pending => {
                log(LogCategory::Arbiter, LogLevel::Debug, || {
                    format!("arbiter: request withdrawn in {}", self.state.name())
                });
                ArbiterState::Idle
            }
            ArbiterState::Request if inputs.bus_grant => ArbiterState::WaitFree,
            ArbiterState::Request => ArbiterState::Request,
            ArbiterState::WaitFree if inputs.bus_quiet && inputs.slave_idle => ArbiterState::Own,
            ArbiterState::WaitFree => ArbiterState::WaitFree,
            ArbiterState::Own if !inputs.dma_pending && inputs.master_done => ArbiterState::Idle,
            ArbiterState::Own => ArbiterState::Own,
        };

        if next != self.state {
            log(LogCategory::Arbiter, LogLevel::Debug, || {
                format!("arbiter: {} -> {}", self.state.name(), next.name())
            });
        }
        self.state = next;
        drive
    }
}
