//! Execution core of an 8051-family microcontroller.
//!
//! [`Cpu`] holds the register and flag state, [`AddressSpace`] the split
//! code/data memory, and [`ops`] the decoder and ALU that tie them together.
//! Pins are reached only through the [`PinBus`] capability.
//!
//! ```
//! use i8051_sim::{AddressSpace, Cpu, Pins};
//!
//! let mut memory = AddressSpace::default();
//! // MOV A,#56H ; SETB P1.0 ; halt
//! memory.load_code(0, &[0x74, 0x56, 0xD2, 0x90, 0xFF]).unwrap();
//! let mut cpu = Cpu::new();
//! let mut pins = Pins::new();
//! let summary = cpu.run(&mut memory, &mut pins, None).unwrap();
//! assert_eq!(summary.instructions, 2);
//! assert_eq!(cpu.a(), 0x56);
//! assert_eq!(pins.port(1), Some(0x01));
//! ```

mod bit;
mod breakpoint;
mod cpu;
pub mod memory;
pub mod ops;
mod pins;
pub mod sfr;

pub use bit::{BitAddr, BitTarget};
pub use breakpoint::{
    Action, Breakpoints, format_instruction, format_memory, format_registers,
};
pub use cpu::{Cpu, Flag, HALT_OPCODE, Register, RunSummary, Step};
pub use memory::{AddressSpace, ConfigError, MemoryConfig, MemoryError, Space};
pub use ops::{ExecError, decode};
pub use pins::{PinBus, PinId, Pins};
