use std::fmt;

use tracing::{debug, trace};

use crate::memory::{AddressSpace, MemoryError, Space};
use crate::ops::{self, ExecError};
use crate::pins::PinBus;
use crate::sfr::*;

/// Opcode byte the driver treats as "stop here". It is never decoded.
pub const HALT_OPCODE: u8 = 0xFF;

/// A status flag in the program status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    C,
    AC,
    F0,
    RS1,
    RS0,
    OV,
    P,
}

impl Flag {
    pub const ALL: [Flag; 7] = [
        Flag::C,
        Flag::AC,
        Flag::F0,
        Flag::RS1,
        Flag::RS0,
        Flag::OV,
        Flag::P,
    ];

    /// Bit position within the packed PSW byte.
    pub const fn bit(self) -> u8 {
        match self {
            Flag::C => PSW_C,
            Flag::AC => PSW_AC,
            Flag::F0 => PSW_F0,
            Flag::RS1 => PSW_RS1,
            Flag::RS0 => PSW_RS0,
            Flag::OV => PSW_OV,
            Flag::P => PSW_P,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flag::C => "CY",
            Flag::AC => "AC",
            Flag::F0 => "F0",
            Flag::RS1 => "RS1",
            Flag::RS0 => "RS0",
            Flag::OV => "OV",
            Flag::P => "P",
        };
        f.write_str(name)
    }
}

/// A register that can be inspected or poked from outside the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    PC,
    A,
    B,
    DPTR,
    /// R0-R7, which are data-space cells 0-7.
    R(u8),
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::PC => write!(f, "PC"),
            Register::A => write!(f, "A"),
            Register::B => write!(f, "B"),
            Register::DPTR => write!(f, "DPTR"),
            Register::R(n) => write!(f, "R{n}"),
        }
    }
}

/// Outcome of a single [`Cpu::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The opcode was fetched and executed.
    Executed(u8),
    /// The halt sentinel sits at PC. Nothing was fetched.
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub instructions: u64,
    /// `false` if the run stopped because it hit the instruction limit.
    pub halted: bool,
}

/// Register and flag state of the processor.
///
/// Fields are private: the decoder updates them through narrow operations
/// that recompute the dependent flags together with the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cpu {
    pc: u16,
    a: u8,
    b: u8,
    dptr: u16,
    psw: u8,
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every register, flag and the program counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Read the byte at PC from code space and advance PC past it.
    pub fn fetch(&mut self, memory: &AddressSpace) -> Result<u8, MemoryError> {
        let value = memory.read_code(self.pc as usize)?;
        self.pc = self
            .pc
            .checked_add(1)
            .ok_or(MemoryError::OutOfBounds {
                space: Space::Code,
                addr: self.pc as usize + 1,
                len: memory.code_len(),
            })?;
        Ok(value)
    }

    /// Decode and execute an opcode that has already been fetched. Operand
    /// bytes are fetched as the instruction needs them.
    pub fn execute<P: PinBus + ?Sized>(
        &mut self,
        opcode: u8,
        memory: &mut AddressSpace,
        pins: &mut P,
    ) -> Result<(), ExecError> {
        ops::execute(self, memory, pins, opcode)
    }

    /// Run one instruction, or report the halt sentinel at PC.
    pub fn step<P: PinBus + ?Sized>(
        &mut self,
        memory: &mut AddressSpace,
        pins: &mut P,
    ) -> Result<Step, ExecError> {
        let pc = self.pc;
        if memory.read_code(pc as usize)? == HALT_OPCODE {
            return Ok(Step::Halted);
        }
        let op = self.fetch(memory)?;
        trace!("{pc:04X}: {op:02X}");
        self.execute(op, memory, pins)?;
        Ok(Step::Executed(op))
    }

    /// Step until the halt sentinel or until `limit` instructions have run.
    /// An error aborts the run and leaves the state as it was at the failure.
    pub fn run<P: PinBus + ?Sized>(
        &mut self,
        memory: &mut AddressSpace,
        pins: &mut P,
        limit: Option<u64>,
    ) -> Result<RunSummary, ExecError> {
        let mut instructions = 0;
        loop {
            if limit.is_some_and(|max| instructions >= max) {
                debug!(instructions, pc = self.pc, "instruction limit reached");
                return Ok(RunSummary {
                    instructions,
                    halted: false,
                });
            }
            match self.step(memory, pins)? {
                Step::Executed(_) => instructions += 1,
                Step::Halted => {
                    debug!(instructions, pc = self.pc, "halted");
                    return Ok(RunSummary {
                        instructions,
                        halted: true,
                    });
                }
            }
        }
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn pc_set(&mut self, value: u16) {
        self.pc = value;
    }

    pub fn a(&self) -> u8 {
        self.a
    }

    /// Overwrite A without touching any flag.
    pub fn a_set(&mut self, value: u8) {
        self.a = value;
    }

    pub fn b(&self) -> u8 {
        self.b
    }

    pub fn b_set(&mut self, value: u8) {
        self.b = value;
    }

    pub fn dptr(&self) -> u16 {
        self.dptr
    }

    pub fn dptr_set(&mut self, value: u16) {
        self.dptr = value;
    }

    pub fn psw(&self, flag: Flag) -> bool {
        self.psw & (1 << flag.bit()) != 0
    }

    pub fn psw_set(&mut self, flag: Flag, value: bool) {
        if value {
            self.psw |= 1 << flag.bit();
        } else {
            self.psw &= !(1 << flag.bit());
        }
    }

    /// The seven flags packed as `CY AC F0 RS1 RS0 OV - P`. Bit 1 is always 0.
    pub fn packed_flags(&self) -> u8 {
        self.psw & !(1 << PSW_RES)
    }

    /// R0-R7 live in the first eight data-space cells.
    pub fn r(&self, x: u8, memory: &AddressSpace) -> Result<u8, MemoryError> {
        memory.read_data(x as usize)
    }

    pub fn register(&self, reg: Register, memory: &AddressSpace) -> Result<u16, MemoryError> {
        Ok(match reg {
            Register::PC => self.pc,
            Register::A => self.a as u16,
            Register::B => self.b as u16,
            Register::DPTR => self.dptr,
            Register::R(x) => self.r(x, memory)? as u16,
        })
    }

    /// Set a register, truncating `value` to the register's width.
    pub fn register_set(
        &mut self,
        reg: Register,
        value: u16,
        memory: &mut AddressSpace,
    ) -> Result<(), MemoryError> {
        match reg {
            Register::PC => self.pc = value,
            Register::A => self.a = value as u8,
            Register::B => self.b = value as u8,
            Register::DPTR => self.dptr = value,
            Register::R(x) => memory.write_data(x as usize, value as u8)?,
        }
        Ok(())
    }

    /// Recompute the parity flag from `value`.
    pub(crate) fn update_parity(&mut self, value: u8) {
        self.psw_set(Flag::P, ops::parity(value));
    }

    /// Load A and recompute parity from the new value.
    pub(crate) fn load_a(&mut self, value: u8) {
        self.a = value;
        self.update_parity(value);
    }

    /// Store the flags produced by an ALU operation and return its result.
    /// Parity follows the result.
    pub(crate) fn apply_arith(&mut self, (value, c, ov, ac): (u8, bool, bool, bool)) -> u8 {
        self.psw_set(Flag::C, c);
        self.psw_set(Flag::OV, ov);
        self.psw_set(Flag::AC, ac);
        self.update_parity(value);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(bytes: &[u8]) -> AddressSpace {
        let mut memory = AddressSpace::default();
        memory.load_code(0, bytes).unwrap();
        memory
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut cpu = Cpu::new();
        cpu.a_set(1);
        cpu.b_set(2);
        cpu.dptr_set(0x1234);
        cpu.pc_set(9);
        for flag in Flag::ALL {
            cpu.psw_set(flag, true);
        }
        cpu.reset();
        assert_eq!(cpu, Cpu::new());
        assert_eq!(cpu.packed_flags(), 0);
    }

    #[test]
    fn packed_flags_layout() {
        let mut cpu = Cpu::new();
        cpu.psw_set(Flag::C, true);
        assert_eq!(cpu.packed_flags(), 0x80);
        cpu.psw_set(Flag::AC, true);
        cpu.psw_set(Flag::F0, true);
        cpu.psw_set(Flag::RS1, true);
        cpu.psw_set(Flag::RS0, true);
        cpu.psw_set(Flag::OV, true);
        cpu.psw_set(Flag::P, true);
        assert_eq!(cpu.packed_flags(), 0xFD);
        assert_eq!(cpu.packed_flags() & (1 << PSW_RES), 0);
        cpu.psw_set(Flag::C, false);
        assert_eq!(cpu.packed_flags(), 0x7D);
        assert!(!cpu.psw(Flag::C));
        assert!(cpu.psw(Flag::OV));
    }

    #[test]
    fn fetch_advances_pc() {
        let memory = program(&[0x74, 0x42]);
        let mut cpu = Cpu::new();
        assert_eq!(cpu.fetch(&memory), Ok(0x74));
        assert_eq!(cpu.fetch(&memory), Ok(0x42));
        assert_eq!(cpu.pc(), 2);
    }

    #[test]
    fn fetch_past_end_fails_without_moving_pc() {
        let memory = program(&[]);
        let mut cpu = Cpu::new();
        cpu.pc_set(4096);
        assert!(matches!(
            cpu.fetch(&memory),
            Err(MemoryError::OutOfBounds {
                space: Space::Code,
                addr: 4096,
                ..
            })
        ));
        assert_eq!(cpu.pc(), 4096);
    }

    #[test]
    fn registers_by_name() {
        let mut memory = AddressSpace::default();
        let mut cpu = Cpu::new();
        cpu.register_set(Register::A, 0x1FF, &mut memory).unwrap();
        cpu.register_set(Register::R(5), 0x42, &mut memory).unwrap();
        cpu.register_set(Register::DPTR, 0xBEEF, &mut memory).unwrap();
        assert_eq!(cpu.a(), 0xFF);
        assert_eq!(memory.read_data(5), Ok(0x42));
        assert_eq!(cpu.register(Register::R(5), &memory), Ok(0x42));
        assert_eq!(cpu.register(Register::DPTR, &memory), Ok(0xBEEF));
        assert_eq!(Register::R(5).to_string(), "R5");
    }

    #[test]
    fn halt_sentinel_stops_before_fetch() {
        let mut memory = program(&[HALT_OPCODE]);
        let mut cpu = Cpu::new();
        assert_eq!(cpu.step(&mut memory, &mut ()), Ok(Step::Halted));
        assert_eq!(cpu, Cpu::new());
    }

    #[test]
    fn run_respects_limit() {
        let mut memory = program(&[0xE4, 0xE4, 0xE4, HALT_OPCODE]);
        let mut cpu = Cpu::new();
        let summary = cpu.run(&mut memory, &mut (), Some(2)).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                instructions: 2,
                halted: false
            }
        );
        let summary = cpu.run(&mut memory, &mut (), None).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                instructions: 1,
                halted: true
            }
        );
        assert_eq!(cpu.pc(), 3);
    }
}
