use thiserror::Error;

use crate::unit::UnitId;

/// Conditions an instruction can raise. None of them stop the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum InstructionFault {
    #[error("unknown instruction")]
    UnknownInstruction,

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("reserved instruction")]
    ReservedInstruction,

    // instruction fetch outside of shared memory
    #[error("address error")]
    AddressError,
}

impl InstructionFault {
    pub const ALL: [InstructionFault; 4] = [
        InstructionFault::UnknownInstruction,
        InstructionFault::ArithmeticOverflow,
        InstructionFault::ReservedInstruction,
        InstructionFault::AddressError,
    ];

    fn index(&self) -> usize {
        match self {
            InstructionFault::UnknownInstruction  => 0,
            InstructionFault::ArithmeticOverflow  => 1,
            InstructionFault::ReservedInstruction => 2,
            InstructionFault::AddressError        => 3,
        }
    }
}

/// A fault as seen from outside the execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{unit}: {kind} at ${pc:08X} (word ${word:08X})")]
pub struct Fault {
    pub kind: InstructionFault,
    pub word: u32,
    pub unit: UnitId,
    pub pc  : u32,
}

/// Fault counters per unit and kind, plus the most recent fault.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    cpu_counts: [u64; 4],
    rcp_counts: [u64; 4],
    last_fault: Option<Fault>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn record(&mut self, fault: &Fault) {
        let counts = match fault.unit {
            UnitId::Cpu => &mut self.cpu_counts,
            UnitId::Rcp => &mut self.rcp_counts,
        };
        counts[fault.kind.index()] = counts[fault.kind.index()].saturating_add(1);
        self.last_fault = Some(*fault);
    }

    pub fn count(&self, unit: UnitId, kind: InstructionFault) -> u64 {
        match unit {
            UnitId::Cpu => self.cpu_counts[kind.index()],
            UnitId::Rcp => self.rcp_counts[kind.index()],
        }
    }

    pub fn total(&self) -> u64 {
        self.cpu_counts.iter().chain(self.rcp_counts.iter()).sum()
    }

    pub fn last_fault(&self) -> Option<&Fault> {
        self.last_fault.as_ref()
    }

    pub fn clear(&mut self) {
        *self = Diagnostics::default();
    }
}
