//! The unified bit-address space used by `SETB`.
//!
//! Real parts overlay special-function-register bits onto a flat 256-entry
//! bit space. This module reproduces that overlay without a full SFR file: a
//! bit address resolves to exactly one physical target, or to an error.

use std::fmt;

use crate::cpu::Flag;
use crate::ops::ExecError;
use crate::pins::PinId;
use crate::sfr::*;

/// Where a bit address lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitTarget {
    /// Bit `bit` of data-space byte `byte`.
    Data { byte: u8, bit: u8 },
    Accumulator(u8),
    B(u8),
    Flag(Flag),
    Pin(PinId),
}

impl BitTarget {
    /// Resolve a bit address. Ranges are disjoint and checked in priority
    /// order; the flag window at `0xB0..=0xB7` wins over port pins.
    pub fn resolve(addr: u16) -> Result<Self, ExecError> {
        let bit = (addr & 0x07) as u8;
        match addr {
            0..=BIT_DATA_END => Ok(Self::Data {
                byte: (addr >> 3) as u8,
                bit,
            }),
            BIT_CODE_START..=BIT_CODE_END => Err(ExecError::ReadOnlyMemory(addr)),
            BIT_A => Ok(Self::Accumulator(bit)),
            BIT_B => Ok(Self::B(bit)),
            BIT_PSW => Ok(Self::Flag(Flag::C)),
            _ if addr & !0x07 == BIT_FLAGS => match bit {
                2 => Ok(Self::Flag(Flag::OV)),
                4 => Ok(Self::Flag(Flag::AC)),
                5 => Ok(Self::Flag(Flag::P)),
                _ => Err(ExecError::UnknownFlagBit(addr)),
            },
            _ => {
                let port = match addr & !0x07 {
                    BIT_P0 => 0,
                    BIT_P1 => 1,
                    BIT_P2 => 2,
                    BIT_P3 => 3,
                    _ => return Err(ExecError::InvalidBitAddress(addr)),
                };
                PinId::new(port, bit)
                    .map(Self::Pin)
                    .ok_or(ExecError::InvalidBitAddress(addr))
            }
        }
    }
}

impl fmt::Display for BitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data { byte, bit } => write!(f, "DATA({byte:02X}H).{bit}"),
            Self::Accumulator(bit) => write!(f, "ACC.{bit}"),
            Self::B(bit) => write!(f, "B.{bit}"),
            Self::Flag(flag) => fmt::Display::fmt(flag, f),
            Self::Pin(pin) => fmt::Display::fmt(pin, f),
        }
    }
}

/// A raw `SETB` operand. Displays as its resolved target where there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitAddr(pub u16);

impl From<u8> for BitAddr {
    fn from(value: u8) -> Self {
        Self(value as u16)
    }
}

impl fmt::Display for BitAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match BitTarget::resolve(self.0) {
            Ok(target) => fmt::Display::fmt(&target, f),
            Err(_) => write!(f, "{:02X}H", self.0),
        }
    }
}
