//! Macintosh SE/30 Processor Direct Slot bridge.
//!
//! Connects the self-timed 68030 slot to a synchronous Wishbone-style internal
//! bus, in both directions:
//!
//! - **Slave mode**: the host CPU reads or writes addresses in our slot
//!   windows ($F9xxxxxx, $FAxxxxxx, $FBxxxxxx by default). Reads are served
//!   through the `read` port, writes through the `write` port.
//! - **Master mode**: an internal requester on the `dma` port gets the slot
//!   through /BR, /BG, /BGACK arbitration and runs long-word cycles on it.
//!
//! # Clocking
//!
//! Every call to [`Se30Bridge::tick`] is one system clock period. Slot inputs
//! pass through a two-stage [`SynchronizerBank`], so anything the host does
//! becomes visible two ticks later. Within a tick all state machines read the
//! same snapshot and the same registered states; their next states are
//! committed together at the end of the tick.
//!
//! # Components
//!
//! ```text
//!  pads ─▶ SynchronizerBank ─▶ snapshot ─┬─▶ AddressDecoder ─▶ SlaveResponder ─┐
//!                                        ├─▶ BusArbiter ───────────────────────┼─▶ mux ─▶ pads
//!                                        └─▶ MasterEngine ─────────────────────┘
//!  internal bus ◀──────────── read / write ports ─── SlaveResponder
//!  internal bus ◀──────────── dma port ───────────── MasterEngine, BusArbiter
//! ```
//!
//! # Failure handling
//!
//! - Host aborts a cycle (/AS negated early): the responder unwinds to idle.
//! - Misaligned word or 3-byte transfer: all four lanes are selected.
//! - No /DSACK for a DMA cycle: `err` on the DMA port after
//!   [`BridgeConfig::master_timeout`] ticks.
//!
//! Nothing is ever signalled back to the host; /BERR is not wired.

pub mod arbiter;
pub mod config;
pub mod decode;
pub mod master;
pub mod mux;
pub mod pads;
pub mod slave;
pub mod sync_bank;
pub mod testbench;

use arbiter::{ArbiterInputs, ArbiterState, BusArbiter};
use decode::{AddressDecoder, ByteLanes};
use master::{MasterEngine, MasterState};
use pds_core::logging::{log, LogCategory, LogLevel};
use pds_core::signal::EdgeDetector;
use pds_core::types::Tick;
use pds_core::wishbone::Wishbone;
use pds_core::Device;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slave::{SlaveCycle, SlaveResponder, SlaveState};
use sync_bank::SynchronizerBank;
use thiserror::Error;

pub use config::{BridgeConfig, ConfigError, MIN_MASTER_TIMEOUT};
pub use decode::TransferSize;
pub use pads::{DataDriver, PdsInputs, PdsOutputs};

const STATE_VERSION: u64 = 1;
const SYSTEM_NAME: &str = "se30";

#[derive(Debug, Error)]
pub enum Se30Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Unsupported save-state version: {0}")]
    StateVersion(u64),
    #[error("Save state belongs to system {0:?}")]
    StateSystem(String),
    #[error("Malformed save state: {0}")]
    State(#[from] serde_json::Error),
}

/// The three internal bus links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InternalBus {
    /// Host reads; bridge is the requester
    pub read: Wishbone,
    /// Host writes; bridge is the requester
    pub write: Wishbone,
    /// DMA; bridge is the responder
    pub dma: Wishbone,
}

/// Read-only view of the bridge for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebugProbe {
    pub tick: Tick,
    pub address_strobe: bool,
    pub address: u32,
    pub start_cycle: bool,
    pub selected: bool,
    pub lanes: ByteLanes,
    pub slave: &'static str,
    pub arbiter: &'static str,
    pub master: &'static str,
}

pub struct Se30Bridge {
    config: BridgeConfig,
    decoder: AddressDecoder,
    sync: SynchronizerBank,
    strobe_edge: EdgeDetector,
    slave: SlaveResponder,
    arbiter: BusArbiter,
    master: MasterEngine,
    ticks: Tick,
}

impl Default for Se30Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Se30Bridge {
    /// Bridge answering on the default slots with the default DMA timeout.
    pub fn new() -> Self {
        Self::build(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Result<Self, Se30Error> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BridgeConfig) -> Self {
        Self {
            decoder: AddressDecoder::new(&config.slots),
            config,
            sync: SynchronizerBank::new(),
            strobe_edge: EdgeDetector::new(false),
            slave: SlaveResponder::new(),
            arbiter: BusArbiter::new(),
            master: MasterEngine::new(),
            ticks: 0,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn ticks(&self) -> Tick {
        self.ticks
    }

    pub fn slave_state(&self) -> &SlaveState {
        self.slave.state()
    }

    pub fn arbiter_state(&self) -> ArbiterState {
        self.arbiter.state()
    }

    pub fn master_state(&self) -> &MasterState {
        self.master.state()
    }

    /// Ownership token.
    pub fn owns_bus(&self) -> bool {
        self.arbiter.owns()
    }

    pub fn probe(&self) -> DebugProbe {
        let snap = self.sync.snapshot();
        let decoded = self.decoder.decode(snap.address, snap.size);
        DebugProbe {
            tick: self.ticks,
            address_strobe: snap.address_strobe,
            address: snap.address,
            start_cycle: self.strobe_edge.rose(snap.address_strobe),
            selected: decoded.selected,
            lanes: decoded.lanes,
            slave: self.slave.state().name(),
            arbiter: self.arbiter.state().name(),
            master: self.master.state().name(),
        }
    }

    /// Run one system clock period.
    ///
    /// `pads` are the levels on the slot pins during this period, `bus` the
    /// internal links. Returns what the bridge drives onto the slot during
    /// this period.
    pub fn tick(&mut self, pads: &PdsInputs, bus: &mut InternalBus) -> PdsOutputs {
        self.tick_with(bus, |_| *pads)
    }

    /// Like [`Se30Bridge::tick`], but the pad levels are computed from this
    /// tick's drive. Use it when the caller models the wires, so the
    /// bridge's own /AS, data and /DSACK show up on the pins it samples.
    pub fn tick_with<F>(&mut self, bus: &mut InternalBus, pads_fn: F) -> PdsOutputs
    where
        F: FnOnce(&PdsOutputs) -> PdsInputs,
    {
        let snap = self.sync.snapshot();
        let owned = self.arbiter.owns();
        let slave_idle = self.slave.is_idle();
        let master_done = self.master.is_done();

        let start = if self.strobe_edge.rose(snap.address_strobe) && !owned {
            let decoded = self.decoder.decode(snap.address, snap.size);
            decoded.selected.then_some(SlaveCycle {
                address: snap.address,
                read: snap.read,
                lanes: decoded.lanes,
            })
        } else {
            None
        };

        let slave_drive = self.slave.step(start, &snap, &mut bus.read, &mut bus.write);
        let master_drive =
            self.master
                .step(owned, &snap, &mut bus.dma, self.config.master_timeout);
        let arbiter_drive = self.arbiter.step(ArbiterInputs {
            dma_pending: bus.dma.requesting(),
            bus_grant: snap.bus_grant,
            bus_quiet: snap.bus_quiet(),
            slave_idle,
            master_done,
        });

        let outputs = mux::resolve(&slave_drive, &master_drive, &arbiter_drive);
        let pads = pads_fn(&outputs);

        log(LogCategory::Pads, LogLevel::Trace, || {
            format!(
                "tick {}: /AS={} A={:08X} D={:08X} -> {:?}",
                self.ticks, pads.as_n as u8, pads.address, pads.data, outputs.data_driver
            )
        });

        self.strobe_edge.clock(snap.address_strobe);
        self.sync.clock(&pads);
        self.ticks += 1;

        outputs
    }
}

impl Device for Se30Bridge {
    type Error = Se30Error;

    fn reset(&mut self) {
        self.sync.reset();
        self.strobe_edge = EdgeDetector::new(false);
        self.slave.reset();
        self.arbiter.reset();
        self.master.reset();
        self.ticks = 0;
    }

    fn save_state(&self) -> Value {
        serde_json::json!({
            "version": STATE_VERSION,
            "system": SYSTEM_NAME,
            "ticks": self.ticks,
            "config": self.config,
            "sync": self.sync,
            "strobe_edge": self.strobe_edge,
            "slave": self.slave,
            "arbiter": self.arbiter,
            "master": self.master,
        })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), Self::Error> {
        let version = v["version"].as_u64().unwrap_or(0);
        if version != STATE_VERSION {
            return Err(Se30Error::StateVersion(version));
        }
        let system = v["system"].as_str().unwrap_or("");
        if system != SYSTEM_NAME {
            return Err(Se30Error::StateSystem(system.to_string()));
        }

        let config: BridgeConfig = serde_json::from_value(v["config"].clone())?;
        config.validate()?;

        // Decode everything before touching self so a bad state changes nothing.
        let ticks = serde_json::from_value(v["ticks"].clone())?;
        let sync = serde_json::from_value(v["sync"].clone())?;
        let strobe_edge = serde_json::from_value(v["strobe_edge"].clone())?;
        let slave = serde_json::from_value(v["slave"].clone())?;
        let arbiter = serde_json::from_value(v["arbiter"].clone())?;
        let master = serde_json::from_value(v["master"].clone())?;

        self.decoder = AddressDecoder::new(&config.slots);
        self.config = config;
        self.ticks = ticks;
        self.sync = sync;
        self.strobe_edge = strobe_edge;
        self.slave = slave;
        self.arbiter = arbiter;
        self.master = master;
        Ok(())
    }

    fn supports_save_states(&self) -> bool {
        true
    }
}
