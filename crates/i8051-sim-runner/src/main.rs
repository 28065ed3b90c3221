use std::path::PathBuf;
use std::process::ExitCode;

use i8051_sim::{
    Action, AddressSpace, Breakpoints, ConfigError, Cpu, ExecError, HALT_OPCODE, MemoryConfig,
    MemoryError, Pins, RunSummary, Step, format_memory, format_registers, memory,
};

use clap::Parser;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod load;

use load::LoadError;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Program file: a hex listing, or raw bytes with --binary
    #[arg(value_name = "PROGRAM")]
    program: PathBuf,

    /// Treat the program file as a raw binary image
    #[arg(short, long)]
    binary: bool,

    /// Code-space size in bytes
    #[arg(long, default_value_t = memory::DEFAULT_CODE_SIZE)]
    code_size: usize,

    /// Data-space size in bytes
    #[arg(long, default_value_t = memory::DEFAULT_DATA_SIZE)]
    data_size: usize,

    /// Maximum number of instructions to execute
    #[arg(short, long, default_value = "100000")]
    max_instructions: u64,

    /// Trace every instruction and the registers after it
    #[arg(short, long)]
    trace: bool,

    /// Dump registers after the instruction at this code address (hex)
    #[arg(long = "break", value_name = "ADDR", value_parser = parse_addr)]
    breakpoints: Vec<u16>,

    /// Also dump the code bytes the program was loaded into
    #[arg(long)]
    dump_code: bool,
}

fn parse_addr(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("`{s}` is not a code address: {e}"))
}

#[derive(Debug, Error)]
enum Error {
    #[error("bad memory configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("execution failed at {pc:04X}: {source}")]
    Exec {
        pc: u16,
        #[source]
        source: ExecError,
    },
    #[error("breakpoint at {pc:04X} failed: {source}")]
    Breakpoint {
        pc: u16,
        #[source]
        source: MemoryError,
    },
}

fn breakpoints(args: &Args) -> Breakpoints {
    let mut breakpoints = Breakpoints::new();
    breakpoints.set_trace(args.trace, args.trace);
    for &addr in &args.breakpoints {
        breakpoints.add(false, addr, Action::Log(format!("break at {addr:04X}")));
        if !args.trace {
            breakpoints.add(false, addr, Action::TraceRegisters);
        }
    }
    breakpoints
}

/// Step until the halt sentinel, the instruction limit or a failure. The
/// machine is left exactly as it was when the loop stopped.
fn drive(
    args: &Args,
    cpu: &mut Cpu,
    memory: &mut AddressSpace,
    pins: &mut Pins,
    breakpoints: &mut Breakpoints,
) -> Result<RunSummary, Error> {
    let mut instructions = 0;
    loop {
        if instructions >= args.max_instructions {
            warn!(
                "stopped at 0x{:04X} after {} instructions without reaching the halt sentinel",
                cpu.pc(),
                instructions
            );
            return Ok(RunSummary {
                instructions,
                halted: false,
            });
        }
        let pc = cpu.pc();
        // A fetch failure is left for `step` to report.
        if memory
            .read_code(pc as usize)
            .is_ok_and(|op| op != HALT_OPCODE)
        {
            breakpoints
                .run(true, pc, cpu, memory)
                .map_err(|source| Error::Breakpoint { pc, source })?;
        }
        match cpu.step(memory, pins) {
            Ok(Step::Executed(_)) => instructions += 1,
            Ok(Step::Halted) => {
                info!(
                    "CPU halted at 0x{:04X} after {} instructions",
                    pc, instructions
                );
                return Ok(RunSummary {
                    instructions,
                    halted: true,
                });
            }
            Err(source) => return Err(Error::Exec { pc, source }),
        }
        breakpoints
            .run(false, pc, cpu, memory)
            .map_err(|source| Error::Breakpoint { pc, source })?;
    }
}

/// Registers, pins and data space, plus the first `code_len` code bytes
/// when asked for.
fn state_dump(cpu: &Cpu, memory: &AddressSpace, pins: &Pins, code_len: Option<usize>) -> String {
    let mut out = match format_registers(cpu, memory) {
        Ok(registers) => registers,
        Err(err) => format!("  registers unavailable: {err}"),
    };
    out.push_str(&format!("\n  {pins}\n  DATA\n"));
    out.push_str(&format_memory(memory.data(), 0));
    if let Some(len) = code_len {
        let code = memory.code();
        out.push_str("\n  CODE\n");
        out.push_str(&format_memory(&code[..len.min(code.len())], 0));
    }
    out
}

fn run(args: &Args) -> Result<(), Error> {
    let mut memory = AddressSpace::new(MemoryConfig {
        code_size: args.code_size,
        data_size: args.data_size,
    })?;
    let program = load::read_program(&args.program, args.binary)?;
    load::install(&mut memory, &program)?;
    info!(
        "loaded {} bytes from {}",
        program.len(),
        args.program.display()
    );

    let mut cpu = Cpu::new();
    let mut pins = Pins::new();
    let mut breakpoints = breakpoints(args);
    let result = drive(args, &mut cpu, &mut memory, &mut pins, &mut breakpoints);

    let code_len = args.dump_code.then_some(program.len());
    println!("{}", state_dump(&cpu, &memory, &pins, code_len));
    result.map(|_| ())
}

pub fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use i8051_sim::{Register, Space};
    use std::cell::Cell;
    use std::rc::Rc;

    fn args(extra: &[&str]) -> Args {
        let argv = ["i8051-sim", "prog.hex"].into_iter().chain(extra.iter().copied());
        Args::try_parse_from(argv).unwrap()
    }

    fn machine(args: &Args, code: &[u8]) -> (Cpu, AddressSpace, Pins) {
        let mut memory = AddressSpace::new(MemoryConfig {
            code_size: args.code_size,
            data_size: args.data_size,
        })
        .unwrap();
        load::install(&mut memory, code).unwrap();
        (Cpu::new(), memory, Pins::new())
    }

    #[test]
    fn addresses_are_hex() {
        assert_eq!(parse_addr("0x1F"), Ok(0x1F));
        assert_eq!(parse_addr("0010"), Ok(0x10));
        assert!(parse_addr("0x10000").is_err());
        assert!(parse_addr("zz").is_err());
    }

    #[test]
    fn cli_shape() {
        use clap::CommandFactory;
        Args::command().debug_assert();

        let args = args(&["--break", "0x10", "--break", "20", "-m", "5"]);
        assert_eq!(args.breakpoints, vec![0x10, 0x20]);
        assert_eq!(args.max_instructions, 5);
        assert_eq!(args.code_size, 4096);
        assert_eq!(args.data_size, 128);
        assert!(!args.binary);
        assert!(!args.dump_code);
    }

    #[test]
    fn runs_to_halt() {
        let args = args(&["-t"]);
        // MOV A,#56H ; SETB P1.0 ; halt
        let (mut cpu, mut memory, mut pins) = machine(&args, &[0x74, 0x56, 0xD2, 0x90, 0xFF]);
        let summary = drive(&args, &mut cpu, &mut memory, &mut pins, &mut breakpoints(&args));
        assert_eq!(
            summary.unwrap(),
            RunSummary {
                instructions: 2,
                halted: true
            }
        );
        assert_eq!(cpu.a(), 0x56);
        assert_eq!(cpu.pc(), 4);
        assert_eq!(pins.port(1), Some(0x01));
    }

    #[test]
    fn stops_at_instruction_limit() {
        let args = args(&["-m", "3"]);
        let (mut cpu, mut memory, mut pins) = machine(&args, &[0xE4; 8]);
        let summary = drive(&args, &mut cpu, &mut memory, &mut pins, &mut breakpoints(&args));
        assert_eq!(
            summary.unwrap(),
            RunSummary {
                instructions: 3,
                halted: false
            }
        );
        assert_eq!(cpu.pc(), 3);
    }

    #[test]
    fn running_off_code_space_keeps_state() {
        let args = args(&["--code-size", "2"]);
        let (mut cpu, mut memory, mut pins) = machine(&args, &[0x74, 0x56]);
        let err = drive(&args, &mut cpu, &mut memory, &mut pins, &mut breakpoints(&args))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Exec {
                pc: 2,
                source: ExecError::Memory(MemoryError::OutOfBounds {
                    space: Space::Code,
                    addr: 2,
                    len: 2
                })
            }
        ));
        assert_eq!(
            err.to_string(),
            "execution failed at 0002: CODE address 0x0002 out of range (length 0x0002)"
        );
        assert_eq!(cpu.a(), 0x56);
        let dump = state_dump(&cpu, &memory, &pins, None);
        assert!(dump.starts_with("  PC=0002  A=56"));
    }

    #[test]
    fn break_addresses_fire_after_their_instruction() {
        let args = args(&["--break", "2"]);
        // CLR A ; CPL A ; DEC A ; halt
        let (mut cpu, mut memory, mut pins) = machine(&args, &[0xE4, 0xF4, 0x14, 0xFF]);
        let mut breakpoints = breakpoints(&args);
        let seen = Rc::new(Cell::new(None));
        let record = seen.clone();
        breakpoints.add(
            false,
            2,
            Action::Run(Box::new(move |cpu: &mut Cpu, _: &mut AddressSpace| {
                record.set(Some(cpu.a()));
            })),
        );
        drive(&args, &mut cpu, &mut memory, &mut pins, &mut breakpoints).unwrap();
        assert_eq!(seen.get(), Some(0xFE));
    }

    #[test]
    fn failing_breakpoint_reports_its_address() {
        let args = args(&[]);
        let (mut cpu, mut memory, mut pins) = machine(&args, &[0x74, 0x11, 0xE4, 0xFF]);
        let mut breakpoints = breakpoints(&args);
        breakpoints.add(true, 2, Action::Set(Register::R(200), 1));
        let err = drive(&args, &mut cpu, &mut memory, &mut pins, &mut breakpoints).unwrap_err();
        assert!(matches!(err, Error::Breakpoint { pc: 2, .. }));
        assert_eq!(cpu.a(), 0x11);
        assert_eq!(cpu.pc(), 2);
    }

    #[test]
    fn dump_includes_data_and_optional_code() {
        let args = args(&["--data-size", "20"]);
        let (cpu, mut memory, pins) = machine(&args, &[0x74, 0x56, 0xFF]);
        memory.write_data(0x12, 0x9C).unwrap();

        let dump = state_dump(&cpu, &memory, &pins, None);
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines[3], "  DATA");
        assert_eq!(
            lines[4],
            "  0000: 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00"
        );
        assert_eq!(lines[5], "  0010: 00 00 9C 00");
        assert!(!dump.contains("CODE"));

        let dump = state_dump(&cpu, &memory, &pins, Some(3));
        assert!(dump.ends_with("  CODE\n  0000: 74 56 FF"));
    }

    #[test]
    fn dump_survives_tiny_data_space() {
        let args = args(&["--data-size", "4"]);
        let (cpu, memory, pins) = machine(&args, &[0xFF]);
        let dump = state_dump(&cpu, &memory, &pins, None);
        assert!(dump.starts_with("  registers unavailable: DATA address 0x0004"));
        assert!(dump.ends_with("  0000: 00 00 00 00"));
    }
}
