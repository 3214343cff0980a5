//! Synchronous request/acknowledge memory interface (Wishbone classic subset).
//!
//! One [`Wishbone`] record is a full point-to-point link. The requester owns
//! `cyc`, `stb`, `we`, `adr`, `sel` and `dat_w`; the responder owns `ack`,
//! `err` and `dat_r`. A transfer completes in the tick where the responder
//! presents `ack` (or `err`) while `cyc && stb` are held.
//!
//! `adr` is word granular: byte address `A` is presented as `A >> 2`, and
//! `sel` picks byte lanes with bit 3 being the most significant byte.

use serde::{Deserialize, Serialize};

/// Number of address bits carried by `adr`.
pub const ADDRESS_BITS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Wishbone {
    pub cyc: bool,
    pub stb: bool,
    pub we: bool,
    pub adr: u32,
    pub sel: u8,
    pub dat_w: u32,
    pub dat_r: u32,
    pub ack: bool,
    pub err: bool,
}

impl Wishbone {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request is pending when both cycle and strobe are held.
    #[inline]
    pub fn requesting(&self) -> bool {
        self.cyc && self.stb
    }

    /// Requester drives a read.
    pub fn drive_read(&mut self, adr: u32, sel: u8) {
        self.cyc = true;
        self.stb = true;
        self.we = false;
        self.adr = adr & word_mask();
        self.sel = sel & 0x0F;
    }

    /// Requester drives a write.
    pub fn drive_write(&mut self, adr: u32, sel: u8, data: u32) {
        self.cyc = true;
        self.stb = true;
        self.we = true;
        self.adr = adr & word_mask();
        self.sel = sel & 0x0F;
        self.dat_w = data;
    }

    /// Requester releases the link. `adr`, `sel` and `dat_w` keep their last
    /// values, as a real register would.
    pub fn release(&mut self) {
        self.cyc = false;
        self.stb = false;
        self.we = false;
    }

    /// Responder side: nothing to report this tick.
    pub fn idle_response(&mut self) {
        self.ack = false;
        self.err = false;
    }

    /// Byte address of the word currently presented.
    pub fn byte_address(&self) -> u32 {
        self.adr << 2
    }
}

#[inline]
fn word_mask() -> u32 {
    (1 << ADDRESS_BITS) - 1
}

/// Merge `data` into `word`, touching only the byte lanes set in `sel`.
pub fn merge_lanes(word: u32, data: u32, sel: u8) -> u32 {
    let mut mask = 0u32;
    for lane in 0..4 {
        if sel & (1 << lane) != 0 {
            mask |= 0xFF << (lane * 8);
        }
    }
    (word & !mask) | (data & mask)
}
