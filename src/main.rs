use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use n64_interp::debugger::{parse_int_u32, Debugger};
use n64_interp::*;

#[derive(Parser, Debug)]
#[command(version, about = "Dual-unit MIPS interpreter (CPU + RCP)")]
struct Args {
    /// Big endian program image, loaded at word index 0
    image: PathBuf,

    /// Size of shared memory in 32-bit words
    #[arg(long, default_value = "$10000", value_parser = parse_int_u32)]
    words: u32,

    /// Word index the CPU starts executing at
    #[arg(long, default_value = "0", value_parser = parse_int_u32)]
    cpu_pc: u32,

    /// Word index the RCP starts executing at
    #[arg(long, default_value = "0", value_parser = parse_int_u32)]
    rcp_pc: u32,

    /// Scheduler rounds to run when not debugging
    #[arg(long, default_value_t = 1000)]
    rounds: u64,

    /// Start both units in 64-bit mode
    #[arg(long, default_value_t = false)]
    mode64: bool,

    /// Start both units in user mode instead of kernel mode
    #[arg(long, default_value_t = false)]
    user: bool,

    /// Log every executed instruction
    #[arg(long, default_value_t = false)]
    trace: bool,

    /// Start the interactive debugger instead of running
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let filter = if args.trace {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let image = fs::read(&args.image)?;
    let memory = SharedMemory::from_be_bytes(&image, args.words as usize)?;
    info!(target: "MACHINE", "loaded {} ({} bytes)", args.image.display(), image.len());

    let mode = ModeFlags {
        sixty_four_bit: args.mode64,
        kernel        : !args.user,
    };

    let settings = Settings {
        cpu_mode    : mode,
        rcp_mode    : mode,
        cpu_start_pc: args.cpu_pc,
        rcp_start_pc: args.rcp_pc,
    };

    let machine = Machine::new(SystemCommunication::new(), settings, memory);

    if args.debug {
        let mut debugger = Debugger::new(machine);
        debugger.run()?;
        return Ok(());
    }

    let mut machine = machine;
    let rounds = machine.run(args.rounds);
    if machine.take_break() {
        info!(target: "MACHINE", "stopped on BREAK");
    }

    let diagnostics = machine.diagnostics();
    println!("rounds:      {}", rounds);
    println!("CPU PC:      ${:08X}", machine.cpu().pc());
    println!("RCP PC:      ${:08X}", machine.rcp().pc());
    for unit in [UnitId::Cpu, UnitId::Rcp] {
        for kind in InstructionFault::ALL {
            let count = diagnostics.count(unit, kind);
            if count > 0 {
                println!("{} {}: {}", unit, kind, count);
            }
        }
    }
    if let Some(fault) = diagnostics.last_fault() {
        println!("last fault:  {}", fault);
    }
    println!("fingerprint: ${:016X}", machine.fingerprint());

    Ok(())
}
