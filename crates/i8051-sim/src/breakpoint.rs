use std::collections::BTreeMap;

use crate::cpu::{Cpu, Flag, Register};
use crate::memory::{AddressSpace, MemoryError};
use crate::ops::decode;

use tracing::{Level, info};

pub enum Action {
    /// Log a message to the console.
    Log(String),
    /// Set a register to a value.
    Set(Register, u16),
    /// Enable or disable tracing of instructions.
    SetTraceInstructions(bool),
    /// Enable or disable automatic tracing of registers.
    SetTraceRegisters(bool),
    /// Trace current instruction.
    TraceInstructions,
    /// Trace the current state of the CPU.
    TraceRegisters,
    /// Run an arbitrary function.
    Run(Box<dyn Fn(&mut Cpu, &mut AddressSpace)>),
}

impl Action {
    fn run(
        &self,
        cpu: &mut Cpu,
        memory: &mut AddressSpace,
        state: &mut BreakpointState,
    ) -> Result<(), MemoryError> {
        match self {
            Self::Log(message) => info!("[BP] {}", message),
            Self::Set(register, value) => cpu.register_set(*register, *value, memory)?,
            Self::SetTraceInstructions(value) => state.trace_instructions = *value,
            Self::SetTraceRegisters(value) => state.trace_registers = *value,
            Self::TraceInstructions => {
                if tracing::enabled!(Level::INFO) {
                    info!("{}", format_instruction(memory, cpu.pc())?);
                }
            }
            Self::TraceRegisters => {
                if tracing::enabled!(Level::INFO) {
                    for line in format_registers(cpu, memory)?.lines() {
                        info!("{}", line);
                    }
                }
            }
            Self::Run(func) => func(cpu, memory),
        }
        Ok(())
    }
}

/// `PPPP: BB BB BB   MNEMONIC` for the instruction at `pc`.
pub fn format_instruction(memory: &AddressSpace, pc: u16) -> Result<String, MemoryError> {
    let (bytes, mnemonic) = decode(memory, pc)?;
    let bytes = bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    Ok(format!("{pc:04X}: {bytes:10} {mnemonic}"))
}

/// Two lines: the special registers with the flags, then R0-R7.
pub fn format_registers(cpu: &Cpu, memory: &AddressSpace) -> Result<String, MemoryError> {
    let mut out = format!(
        "  PC={:04X}  A={:02X}  B={:02X}  DPTR={:04X}  PSW={:02X}",
        cpu.pc(),
        cpu.a(),
        cpu.b(),
        cpu.dptr(),
        cpu.packed_flags()
    );
    for flag in Flag::ALL {
        out.push_str(&format!(" {}={}", flag, cpu.psw(flag) as u8));
    }
    out.push_str("\n  ");
    for i in 0..8 {
        out.push_str(&format!("R{}={:02X} ", i, cpu.r(i, memory)?));
    }
    Ok(out)
}

/// Hex dump, sixteen bytes per row. Row addresses count from `base`.
pub fn format_memory(bytes: &[u8], base: usize) -> String {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let hex = chunk
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ");
            format!("  {:04X}: {hex}", base + row * 16)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Default)]
struct BreakpointState {
    trace_instructions: bool,
    trace_registers: bool,
}

/// Actions keyed by code address, run just before or just after the
/// instruction at that address.
#[derive(Default)]
pub struct Breakpoints {
    breakpoints_before: BTreeMap<u16, Vec<Action>>,
    breakpoints_after: BTreeMap<u16, Vec<Action>>,
    state: BreakpointState,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, before: bool, addr: u16, action: Action) {
        if before {
            self.breakpoints_before
                .entry(addr)
                .or_default()
                .push(action);
        } else {
            self.breakpoints_after.entry(addr).or_default().push(action);
        }
    }

    /// Turn the automatic instruction and register traces on or off.
    pub fn set_trace(&mut self, instructions: bool, registers: bool) {
        self.state.trace_instructions = instructions;
        self.state.trace_registers = registers;
    }

    pub fn remove(&mut self, addr: u16) {
        self.breakpoints_before.remove(&addr);
        self.breakpoints_after.remove(&addr);
    }

    pub fn clear(&mut self) {
        self.breakpoints_before.clear();
        self.breakpoints_after.clear();
    }

    /// Run the actions for `pc`. Pass the PC the instruction started at for
    /// the "after" pass, since the CPU has moved on by then.
    pub fn run(
        &mut self,
        before: bool,
        pc: u16,
        cpu: &mut Cpu,
        memory: &mut AddressSpace,
    ) -> Result<(), MemoryError> {
        let actions = if before {
            self.breakpoints_before
                .get(&pc)
                .map(|actions| actions.as_slice())
                .unwrap_or(&[])
        } else {
            self.breakpoints_after
                .get(&pc)
                .map(|actions| actions.as_slice())
                .unwrap_or(&[])
        };
        for action in actions {
            action.run(cpu, memory, &mut self.state)?;
        }
        if self.state.trace_instructions && before {
            Action::TraceInstructions.run(cpu, memory, &mut self.state)?;
        }
        if self.state.trace_registers && !before {
            Action::TraceRegisters.run(cpu, memory, &mut self.state)?;
        }
        Ok(())
    }
}
