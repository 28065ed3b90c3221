//! Instruction decoder and ALU.
//!
//! A single opcode table drives both execution ([`execute`]) and
//! disassembly ([`decode`]). Each instruction fetches its own operand bytes,
//! left to right, as it runs.

use thiserror::Error;

use crate::bit::{BitAddr, BitTarget};
use crate::cpu::Cpu;
use crate::memory::{AddressSpace, MemoryError};
use crate::pins::PinBus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("unsupported opcode {0:02X}H")]
    UnsupportedOpcode(u8),
    #[error("invalid bit address {0:02X}H")]
    InvalidBitAddress(u16),
    #[error("unknown flag bit at bit address {0:02X}H")]
    UnknownFlagBit(u16),
    #[error("bit address {0:04X}H is in read-only code space")]
    ReadOnlyMemory(u16),
}

struct Context<'a, P: PinBus + ?Sized> {
    cpu: &'a mut Cpu,
    memory: &'a mut AddressSpace,
    pins: &'a mut P,
}

impl<P: PinBus + ?Sized> Context<'_, P> {
    #[inline(always)]
    fn fetch(&mut self) -> Result<u8, MemoryError> {
        self.cpu.fetch(self.memory)
    }

    #[inline(always)]
    fn r(&self, x: u8) -> Result<u8, MemoryError> {
        self.memory.read_data(x as usize)
    }

    #[inline(always)]
    fn r_set(&mut self, x: u8, value: u8) -> Result<(), MemoryError> {
        self.memory.write_data(x as usize, value)
    }

    /// Route a bit address and set the bit it names.
    fn set_bit(&mut self, addr: BitAddr) -> Result<BitTarget, ExecError> {
        let target = BitTarget::resolve(addr.0)?;
        match target {
            BitTarget::Data { byte, bit } => {
                let value = self.memory.read_data(byte as usize)?;
                self.memory.write_data(byte as usize, value | 1 << bit)?;
            }
            BitTarget::Accumulator(bit) => {
                let a = self.cpu.a();
                self.cpu.a_set(a | 1 << bit);
            }
            BitTarget::B(bit) => {
                let b = self.cpu.b();
                self.cpu.b_set(b | 1 << bit);
            }
            BitTarget::Flag(flag) => self.cpu.psw_set(flag, true),
            BitTarget::Pin(pin) => self.pins.set_high(pin),
        }
        Ok(target)
    }
}

/// Execute `opcode`, which the caller has already fetched.
pub fn execute<P: PinBus + ?Sized>(
    cpu: &mut Cpu,
    memory: &mut AddressSpace,
    pins: &mut P,
    opcode: u8,
) -> Result<(), ExecError> {
    let mut ctx = Context { cpu, memory, pins };
    dispatch(&mut ctx, opcode)
}

/// `SETB` with a full 16-bit operand. The instruction itself can only carry
/// a byte, so this is the only way to reach the code-space window.
pub fn set_bit<P: PinBus + ?Sized>(
    cpu: &mut Cpu,
    memory: &mut AddressSpace,
    pins: &mut P,
    addr: u16,
) -> Result<BitTarget, ExecError> {
    let mut ctx = Context { cpu, memory, pins };
    ctx.set_bit(BitAddr(addr))
}

macro_rules! op {
    (
        $ctx:ident;
        $(
            OP $name:literal $start:literal $(- $mask:ident $mask_pattern:literal)? $($arg:ident)* $(, $alias:ident = $alias_expr:expr)? => $body:block ;
        )*
    ) => {
        /// Disassemble the instruction at `pc`, returning its bytes and
        /// mnemonic. Unknown opcodes render as `???`.
        pub fn decode(memory: &AddressSpace, pc: u16) -> Result<(Vec<u8>, String), MemoryError> {
            #![allow(unused_variables, unused_mut, unused_assignments)]

            let op = memory.read_code(pc as usize)?;
            let mut bytes = vec![op];

            $(
                if op $(& !$mask_pattern)? == $start {
                    $(let $mask = op & $mask_pattern;)?
                    let mut next_read = pc as usize + 1;
                    $(
                        let $arg = memory.read_code(next_read)?;
                        next_read += 1;
                        bytes.push($arg);
                    )*
                    $(let $alias = $alias_expr;)?
                    return Ok((bytes, format!($name)));
                }
            )*

            Ok((bytes, "???".to_string()))
        }

        fn dispatch<P: PinBus + ?Sized>($ctx: &mut Context<'_, P>, op: u8) -> Result<(), ExecError> {
            $(
                if op $(& !$mask_pattern)? == $start {
                    $(let $mask = op & $mask_pattern;)?
                    $(let $arg = $ctx.fetch()?;)*
                    $(let $alias = $alias_expr;)?
                    $body
                    return Ok(());
                }
            )*

            Err(ExecError::UnsupportedOpcode(op))
        }
    };
}

op! {
    ctx;

    // Accumulator
    OP "CLR A" 0xE4 => { ctx.cpu.load_a(0); };
    OP "CPL A" 0xF4 => {
        let a = !ctx.cpu.a();
        ctx.cpu.load_a(a);
    };

    // MOV families
    OP "MOV A,#{imm8:02X}H" 0x74 imm8 => { ctx.cpu.load_a(imm8); };
    OP "MOV A,R{x}" 0xE8 -x 0x07 => {
        let value = ctx.r(x)?;
        ctx.cpu.load_a(value);
    };
    OP "MOV R{x},A" 0xF8 -x 0x07 => {
        let a = ctx.cpu.a();
        ctx.r_set(x, a)?;
    };
    // The direct target is a code-space address.
    OP "MOV {direct:02X}H,#{imm8:02X}H" 0x75 direct imm8 => {
        ctx.memory.write_code(direct as usize, imm8)?;
        ctx.cpu.update_parity(imm8);
    };
    OP "MOV R{x},#{imm8:02X}H" 0x78 -x 0x07 imm8 => {
        ctx.r_set(x, imm8)?;
        ctx.cpu.update_parity(imm8);
    };

    // Arithmetic
    OP "ADD A,#{imm8:02X}H" 0x24 imm8 => {
        let result = add(ctx.cpu.a(), imm8);
        let value = ctx.cpu.apply_arith(result);
        ctx.cpu.load_a(value);
    };
    OP "ADD A,R{x}" 0x28 -x 0x07 => {
        let result = add(ctx.cpu.a(), ctx.r(x)?);
        let value = ctx.cpu.apply_arith(result);
        ctx.cpu.load_a(value);
    };
    OP "SUB A,#{imm8:02X}H" 0x94 imm8 => {
        let result = sub(ctx.cpu.a(), imm8);
        let value = ctx.cpu.apply_arith(result);
        ctx.cpu.load_a(value);
    };
    OP "SUB A,R{x}" 0x98 -x 0x07 => {
        let result = sub(ctx.cpu.a(), ctx.r(x)?);
        let value = ctx.cpu.apply_arith(result);
        ctx.cpu.load_a(value);
    };
    OP "DEC A" 0x14 => {
        let result = sub(ctx.cpu.a(), 1);
        let value = ctx.cpu.apply_arith(result);
        ctx.cpu.load_a(value);
    };
    OP "DEC R{x}" 0x18 -x 0x07 => {
        let result = sub(ctx.r(x)?, 1);
        let value = ctx.cpu.apply_arith(result);
        ctx.r_set(x, value)?;
    };

    // Logic. Only parity changes.
    OP "ORL A,#{imm8:02X}H" 0x44 imm8 => {
        let a = ctx.cpu.a();
        ctx.cpu.load_a(a | imm8);
    };
    OP "ORL A,R{x}" 0x48 -x 0x07 => {
        let value = ctx.cpu.a() | ctx.r(x)?;
        ctx.cpu.load_a(value);
    };
    OP "ANL A,#{imm8:02X}H" 0x54 imm8 => {
        let a = ctx.cpu.a();
        ctx.cpu.load_a(a & imm8);
    };
    OP "ANL A,R{x}" 0x58 -x 0x07 => {
        let value = ctx.cpu.a() & ctx.r(x)?;
        ctx.cpu.load_a(value);
    };
    OP "XRL A,#{imm8:02X}H" 0x64 imm8 => {
        let a = ctx.cpu.a();
        ctx.cpu.load_a(a ^ imm8);
    };
    OP "XRL A,R{x}" 0x68 -x 0x07 => {
        let value = ctx.cpu.a() ^ ctx.r(x)?;
        ctx.cpu.load_a(value);
    };

    // Bits
    OP "SETB {addr}" 0xD2 bit, addr = BitAddr::from(bit) => { ctx.set_bit(addr)?; };
}

/// True when `value` has an even number of set bits.
#[inline(always)]
pub fn parity(value: u8) -> bool {
    value.count_ones() % 2 == 0
}

/// 8-bit add, widened to 16 bits before the flags are taken.
/// Returns `(result, C, OV, AC)`.
#[inline(always)]
pub fn add(a: u8, b: u8) -> (u8, bool, bool, bool) {
    let sum = a as u16 + b as u16;
    let ac = (a & 0x0F) + (b & 0x0F) >= 0x10;
    let ov = (a ^ b) & 0x80 == 0 && (a ^ sum as u8) & 0x80 != 0;
    (sum as u8, sum & 0x100 != 0, ov, ac)
}

/// 8-bit subtract without borrow-in. C and AC report a borrow out of bit 7
/// and bit 3. Returns `(result, C, OV, AC)`.
#[inline(always)]
pub fn sub(a: u8, b: u8) -> (u8, bool, bool, bool) {
    let diff = (a as i16 - b as i16) as u8;
    let ac = (a & 0x0F) < (b & 0x0F);
    let ov = (a ^ b) & 0x80 != 0 && (a ^ diff) & 0x80 != 0;
    (diff, a < b, ov, ac)
}
