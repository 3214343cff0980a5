//! Address and transfer-size decoding.
//!
//! The 68030 sizes every transfer dynamically: SIZ1:SIZ0 say how many bytes
//! remain to be moved and A1:A0 say where the first one sits. The internal bus
//! is a fixed 32-bit port with per-lane selects, so each (size, offset) pair
//! maps to a lane mask. Lanes are big-endian: bit 3 is D31-D24.
//!
//! | SIZ  | A1:A0 | lanes |
//! |------|-------|-------|
//! | long | any   | 1111  |
//! | byte | 00-11 | 1000, 0100, 0010, 0001 |
//! | word | 00    | 1100  |
//! | word | 10    | 0011  |
//! | 3-byte | 00  | 1110  |
//!
//! Misaligned words and misaligned 3-byte transfers have no lane mapping on a
//! 32-bit responder and are widened to all four lanes.

use pds_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// Default slot identifiers: the three 16 MB windows $F9, $FA and $FB.
pub const DEFAULT_SLOTS: [u8; 3] = [0xF9, 0xFA, 0xFB];

/// SIZ1:SIZ0 transfer size code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferSize {
    Long,
    Byte,
    Word,
    ThreeByte,
}

impl TransferSize {
    /// Decode SIZ1, SIZ0 wire levels.
    pub fn from_lines(siz1: bool, siz0: bool) -> Self {
        match (siz1, siz0) {
            (false, false) => TransferSize::Long,
            (false, true) => TransferSize::Byte,
            (true, false) => TransferSize::Word,
            (true, true) => TransferSize::ThreeByte,
        }
    }

    /// (SIZ1, SIZ0) wire levels.
    pub fn lines(self) -> (bool, bool) {
        match self {
            TransferSize::Long => (false, false),
            TransferSize::Byte => (false, true),
            TransferSize::Word => (true, false),
            TransferSize::ThreeByte => (true, true),
        }
    }
}

/// 4-bit byte-lane select, bit 3 = most significant byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ByteLanes(u8);

impl ByteLanes {
    pub const ALL: ByteLanes = ByteLanes(0b1111);

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Lane mask for a transfer and whether it had to be widened.
pub fn byte_lanes(size: TransferSize, address: u32) -> (ByteLanes, bool) {
    let offset = address & 0b11;
    let lanes = match (size, offset) {
        (TransferSize::Long, _) => Some(0b1111),
        (TransferSize::Byte, n) => Some(0b1000 >> n),
        (TransferSize::Word, 0b00) => Some(0b1100),
        (TransferSize::Word, 0b10) => Some(0b0011),
        (TransferSize::ThreeByte, 0b00) => Some(0b1110),
        _ => None,
    };
    match lanes {
        Some(bits) => (ByteLanes(bits), false),
        None => (ByteLanes::ALL, true),
    }
}

/// Result of decoding one synchronized address phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub selected: bool,
    pub lanes: ByteLanes,
    pub widened: bool,
}

/// Slot-window predicate plus lane decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDecoder {
    slots: Vec<u8>,
}

impl Default for AddressDecoder {
    fn default() -> Self {
        Self::new(&DEFAULT_SLOTS)
    }
}

impl AddressDecoder {
    pub fn new(slots: &[u8]) -> Self {
        Self {
            slots: slots.to_vec(),
        }
    }

    /// True when A31-A24 name one of our slots.
    #[inline]
    pub fn selects(&self, address: u32) -> bool {
        self.slots.contains(&((address >> 24) as u8))
    }

    pub fn decode(&self, address: u32, size: TransferSize) -> Decoded {
        let selected = self.selects(address);
        let (lanes, widened) = byte_lanes(size, address);
        if selected && widened {
            log(LogCategory::Slave, LogLevel::Trace, || {
                format!(
                    "decode: misaligned {:?} at {:08X}, using all lanes",
                    size, address
                )
            });
        }
        Decoded {
            selected,
            lanes,
            widened,
        }
    }
}
