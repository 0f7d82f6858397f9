use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use atomic_counter::{AtomicCounter, RelaxedCounter};
use tracing::{info, warn};

pub mod debugger;
pub mod decode;
pub mod disasm;
pub mod fault;
pub mod memory;
pub mod registers;
pub mod unit;

pub use decode::{decode, sign_extend_16, sign_extend_16_64, InstructionDecode, Operation};
pub use disasm::decode_to_text;
pub use fault::{Diagnostics, Fault, InstructionFault};
pub use memory::{Addressable, ReadWriteFault, SharedMemory};
pub use registers::RegisterFile;
pub use unit::{ExecutionUnit, ModeFlags, StepMode, StepOutput, UnitId};

/// Instructions the CPU executes in one scheduler round
pub const CPU_STEPS_PER_ROUND: u32 = 3;

/// Instructions the RCP executes in one scheduler round
pub const RCP_STEPS_PER_ROUND: u32 = 2;

/// Run one scheduler round: the CPU steps three times, then the RCP steps twice.
/// Faults never stop the round, they are collected in the order they happened.
pub fn run_round<T: Addressable>(cpu: &mut ExecutionUnit, rcp: &mut ExecutionUnit, memory: &mut T) -> Vec<Fault> {
    run_round_with(cpu, rcp, memory, |_, _| {})
}

/// `run_round`, calling `visit` with the unit and PC of every instruction before it executes
pub fn run_round_with<T, F>(cpu: &mut ExecutionUnit, rcp: &mut ExecutionUnit, memory: &mut T, mut visit: F) -> Vec<Fault>
    where T: Addressable, F: FnMut(UnitId, u32) {
    let mut faults = Vec::new();

    for _ in 0..CPU_STEPS_PER_ROUND {
        visit(UnitId::Cpu, cpu.pc());
        if let Err(fault) = cpu.execute(memory) {
            warn!(target: "MACHINE", "{}", fault);
            faults.push(fault);
        }
    }

    for _ in 0..RCP_STEPS_PER_ROUND {
        visit(UnitId::Rcp, rcp.pc());
        if let Err(fault) = rcp.execute(memory) {
            warn!(target: "MACHINE", "{}", fault);
            faults.push(fault);
        }
    }

    faults
}

// Settings -- how the machine comes out of reset
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    pub cpu_mode    : ModeFlags,
    pub rcp_mode    : ModeFlags,
    pub cpu_start_pc: u32,
    pub rcp_start_pc: u32,
}

// Thread-safe values shared between the machine and the front end
#[derive(Clone)]
pub struct SystemCommunication {
    // set from the Ctrl-C handler, checked between rounds
    pub break_rounds: Arc<AtomicBool>,

    // total scheduler rounds executed
    pub total_rounds: Arc<RelaxedCounter>,
}

impl SystemCommunication {
    pub fn new() -> Self {
        Self {
            break_rounds: Arc::new(AtomicBool::new(false)),
            total_rounds: Arc::new(RelaxedCounter::new(0)),
        }
    }

    pub fn break_run(&self) {
        self.break_rounds.store(true, Ordering::SeqCst);
    }
}

impl Default for SystemCommunication {
    fn default() -> Self {
        Self::new()
    }
}

/// Both execution units and the memory they share
pub struct Machine {
    comms: SystemCommunication,
    settings: Settings,

    memory: SharedMemory,
    initial_memory: SharedMemory,

    cpu: ExecutionUnit,
    rcp: ExecutionUnit,

    diagnostics: Diagnostics,

    // a unit executed BREAK during the last round
    break_hit: bool,
}

impl Machine {
    pub fn new(comms: SystemCommunication, settings: Settings, memory: SharedMemory) -> Machine {
        info!(target: "MACHINE", "{} words of shared memory, CPU at ${:08X}, RCP at ${:08X}",
              memory.len(), settings.cpu_start_pc, settings.rcp_start_pc);

        Machine {
            cpu           : ExecutionUnit::new(UnitId::Cpu, settings.cpu_mode, settings.cpu_start_pc),
            rcp           : ExecutionUnit::new(UnitId::Rcp, settings.rcp_mode, settings.rcp_start_pc),
            initial_memory: memory.clone(),
            memory        : memory,
            comms         : comms,
            settings      : settings,
            diagnostics   : Diagnostics::new(),
            break_hit     : false,
        }
    }

    /// Restore memory to the loaded image and both units to their start PCs
    pub fn reset(&mut self) {
        info!(target: "MACHINE", "reset");

        self.memory = self.initial_memory.clone();
        self.cpu.reset(self.settings.cpu_start_pc);
        self.rcp.reset(self.settings.rcp_start_pc);
        self.cpu.set_mode(self.settings.cpu_mode);
        self.rcp.set_mode(self.settings.rcp_mode);
        self.diagnostics.clear();
        self.comms.total_rounds.reset();
        self.comms.break_rounds.store(false, Ordering::SeqCst);
        self.break_hit = false;
    }

    pub fn run_round(&mut self) -> Vec<Fault> {
        self.run_round_with(|_, _| {})
    }

    /// One round, calling `visit` with the unit and PC of every instruction before it executes
    pub fn run_round_with<F: FnMut(UnitId, u32)>(&mut self, visit: F) -> Vec<Fault> {
        let faults = run_round_with(&mut self.cpu, &mut self.rcp, &mut self.memory, visit);
        for fault in faults.iter() {
            self.diagnostics.record(fault);
        }

        // either unit can request a break, don't short circuit so both flags are cleared
        let cpu_break = self.cpu.take_break();
        let rcp_break = self.rcp.take_break();
        self.break_hit |= cpu_break || rcp_break;

        self.comms.total_rounds.inc();
        faults
    }

    /// Run up to `rounds` rounds, stopping early on a BREAK instruction or when the break
    /// flag is raised. Returns the number of rounds executed.
    pub fn run(&mut self, rounds: u64) -> u64 {
        // a BREAK from an earlier round nobody took is stale
        self.break_hit = false;

        let mut rounds_ran = 0;
        while rounds_ran < rounds && !self.comms.break_rounds.load(Ordering::SeqCst) {
            self.run_round();
            rounds_ran += 1;

            if self.break_hit {
                break;
            }
        }

        self.comms.break_rounds.store(false, Ordering::SeqCst);
        rounds_ran
    }

    /// True once after a BREAK instruction was executed by either unit
    pub fn take_break(&mut self) -> bool {
        std::mem::replace(&mut self.break_hit, false)
    }

    pub fn cpu(&self) -> &ExecutionUnit {
        &self.cpu
    }

    pub fn rcp(&self) -> &ExecutionUnit {
        &self.rcp
    }

    pub fn unit(&self, id: UnitId) -> &ExecutionUnit {
        match id {
            UnitId::Cpu => &self.cpu,
            UnitId::Rcp => &self.rcp,
        }
    }

    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut SharedMemory {
        &mut self.memory
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn comms(&self) -> &SystemCommunication {
        &self.comms
    }

    pub fn total_rounds(&self) -> usize {
        self.comms.total_rounds.get()
    }

    /// CRC-64 over both register files, both PCs and pending branches, and shared memory.
    /// Two runs of the same image for the same number of rounds produce the same value.
    pub fn fingerprint(&self) -> u64 {
        let mut crc = 0u64;

        for unit in [&self.cpu, &self.rcp] {
            for reg in unit.regs().regs().iter() {
                crc = crc64::crc64(crc, &reg.to_be_bytes());
            }
            crc = crc64::crc64(crc, &unit.pc().to_be_bytes());

            let latch = unit.pending_branch().map_or(u64::MAX, |target| target as u64);
            crc = crc64::crc64(crc, &latch.to_be_bytes());
        }

        for word in self.memory.words() {
            crc = crc64::crc64(crc, &word.to_be_bytes());
        }

        crc
    }
}
