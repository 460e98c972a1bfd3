//! CLI entry point: load an ELF image, run the controller against a
//! cached or uncached memory interface, and join host-communication
//! messages into stdout/log-file output the way the original lab harness
//! did.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use mem_hier::{CachedMemory, MainMemory, MemoryInterface, UncachedMemory};
use riscv_cpu::Cpu;
use riscv_isa::HostMessage;

#[derive(Parser)]
#[command(name = "rvsim", about = "Cycle-accurate RISC-V32I simulator")]
struct Args {
    /// Path to the guest ELF image.
    #[arg(long)]
    elf: PathBuf,

    /// Path the harness appends host output to, mirroring stderr.
    #[arg(long, default_value = "CachedResults.txt")]
    out: PathBuf,

    /// Bypass both caches and use the fixed-latency uncached memory
    /// interface instead.
    #[arg(long)]
    uncached: bool,

    /// Cap the number of cycles to run before giving up (0 = unbounded).
    #[arg(long, default_value_t = 0)]
    max_cycles: u64,
}

/// What a finished run amounts to, independent of `std::process::ExitCode`
/// (which has no `PartialEq`/`Debug`, so tests can't assert on it directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Passed,
    Failed(u8),
}

impl From<RunOutcome> for ExitCode {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Passed => ExitCode::SUCCESS,
            RunOutcome::Failed(code) => ExitCode::from(code),
        }
    }
}

/// Apply one drained host-communication message to `print_int`/`out`.
/// Returns `Some` once the guest has asked to terminate.
fn handle_message(message: HostMessage, print_int: &mut i32, out: &mut impl Write) -> Option<RunOutcome> {
    match message {
        HostMessage::ExitCode(0) => {
            eprintln!("PASSED");
            let _ = writeln!(out, "PASSED");
            Some(RunOutcome::Passed)
        }
        HostMessage::ExitCode(code) => {
            eprintln!("FAILED: exit code = {code}");
            Some(RunOutcome::Failed((code & 0xFF) as u8))
        }
        HostMessage::PrintChar(byte) => {
            eprint!("{}", byte as char);
            let _ = write!(out, "{}", byte as char);
            None
        }
        HostMessage::PrintIntLow(low) => {
            *print_int = i32::from(low);
            None
        }
        HostMessage::PrintIntHigh(high) => {
            *print_int |= i32::from(high) << 16;
            eprint!("{print_int}");
            let _ = write!(out, "{print_int}");
            None
        }
    }
}

fn run<M: MemoryInterface>(mut cpu: Cpu, mut mem: M, max_cycles: u64, out: &mut impl Write) -> ExitCode {
    let mut print_int: i32 = 0;
    let mut cycle: u64 = 0;

    loop {
        cpu.tick(&mut mem);
        mem.clock();
        cycle += 1;

        if let Some(message) = cpu.take_message() {
            if let Some(outcome) = handle_message(message, &mut print_int, out) {
                return outcome.into();
            }
        }

        if max_cycles != 0 && cycle >= max_cycles {
            log::warn!("rvsim: reached max-cycles ({max_cycles}) without a host exit message");
            return ExitCode::FAILURE;
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut raw = MainMemory::new();
    if let Err(err) = elf_loader::load_elf_file(&args.elf, &mut raw) {
        eprintln!("ERROR: load_elf: {err}");
        return ExitCode::FAILURE;
    }

    let mut out = match OpenOptions::new().create(true).append(true).open(&args.out) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("ERROR: could not open output file {:?}: {err}", args.out);
            return ExitCode::FAILURE;
        }
    };

    let mut cpu = Cpu::new();
    cpu.reset(riscv_isa::RESET_VECTOR);

    if args.uncached {
        run(cpu, UncachedMemory::new(raw), args.max_cycles, &mut out)
    } else {
        run(cpu, CachedMemory::new(raw), args.max_cycles, &mut out)
    }
}
