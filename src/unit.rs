use std::fmt;

use num_traits::{PrimInt, Signed, WrappingAdd};
use tracing::{debug, trace, warn};

use crate::decode::{sign_extend_16, CopOp, InstructionDecode, Operation};
use crate::disasm;
use crate::fault::{Fault, InstructionFault};
use crate::memory::Addressable;
use crate::registers::RegisterFile;

// link register
const RA: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitId {
    Cpu,
    Rcp,
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitId::Cpu => write!(f, "CPU"),
            UnitId::Rcp => write!(f, "RCP"),
        }
    }
}

/// Operating mode bits that gate the doubleword instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeFlags {
    pub sixty_four_bit: bool,
    pub kernel: bool,
}

impl Default for ModeFlags {
    // both units come out of reset in 32-bit kernel mode
    fn default() -> Self {
        ModeFlags {
            sixty_four_bit: false,
            kernel: true,
        }
    }
}

impl ModeFlags {
    pub fn doubleword_enabled(&self) -> bool {
        self.sixty_four_bit || self.kernel
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Execute,
    Disassemble,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutput {
    Executed,
    Text(String),
}

/// One instruction-stepping engine. The CPU and the RCP are both instances of this,
/// each with its own register file, stepping against the same shared memory.
pub struct ExecutionUnit {
    id: UnitId,
    regs: RegisterFile,
    mode: ModeFlags,

    // pending branch target. applied once the delay slot instruction has executed
    branch_latch: Option<u32>,

    // set by BREAK, cleared by take_break()
    break_hit: bool,

    // instruction decode values
    inst: InstructionDecode,

    retired: u64,
}

impl ExecutionUnit {
    pub fn new(id: UnitId, mode: ModeFlags, pc: u32) -> ExecutionUnit {
        ExecutionUnit {
            id          : id,
            regs        : RegisterFile::new(pc),
            mode        : mode,
            branch_latch: None,
            break_hit   : false,
            inst        : InstructionDecode::default(),
            retired     : 0,
        }
    }

    pub fn reset(&mut self, pc: u32) {
        self.regs.reset(pc);
        self.branch_latch = None;
        self.break_hit = false;
        self.inst = InstructionDecode::default();
        self.retired = 0;
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn regs(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    pub fn pc(&self) -> u32 {
        self.regs.pc()
    }

    pub fn mode(&self) -> ModeFlags {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ModeFlags) {
        self.mode = mode;
    }

    pub fn pending_branch(&self) -> Option<u32> {
        self.branch_latch
    }

    /// Instructions executed since reset, faulting ones included
    pub fn retired(&self) -> u64 {
        self.retired
    }

    /// Returns true once after a BREAK instruction executed
    pub fn take_break(&mut self) -> bool {
        std::mem::replace(&mut self.break_hit, false)
    }

    /// Execute the instruction at PC, or in Disassemble mode only render it as text.
    /// Disassembly never changes registers, PC, the branch latch or memory.
    pub fn step<T: Addressable>(&mut self, bus: &mut T, mode: StepMode) -> Result<StepOutput, Fault> {
        match mode {
            StepMode::Execute => {
                self.execute(bus)?;
                Ok(StepOutput::Executed)
            },

            StepMode::Disassemble => {
                let text = self.disassemble(bus)?;
                Ok(StepOutput::Text(text))
            },
        }
    }

    pub fn disassemble<T: Addressable>(&self, bus: &T) -> Result<String, Fault> {
        let pc = self.regs.pc();
        let word = bus.read_u32(pc).map_err(|_| Fault {
            kind: InstructionFault::AddressError,
            word: 0,
            unit: self.id,
            pc  : pc,
        })?;

        Ok(disasm::decode_to_text(word))
    }

    pub fn execute<T: Addressable>(&mut self, bus: &mut T) -> Result<(), Fault> {
        let pc = self.regs.pc();

        // a latch set by the previous instruction means this one is its delay slot
        let delay_slot_target = self.branch_latch.take();

        let (word, result) = match bus.read_u32(pc) {
            Ok(word) => {
                self.inst = InstructionDecode::decode(word);
                let op = Operation::lookup(&self.inst);

                debug!(target: "UNIT", "{} ${:08X}: {}", self.id, pc, disasm::disassemble(&self.inst, op));

                if delay_slot_target.is_some() && op.is_branch() {
                    warn!(target: "UNIT", "{} ${:08X}: branch in a delay slot", self.id, pc);
                }

                // pc points at the delay slot while the instruction executes
                self.regs.set_pc(pc.wrapping_add(1));
                (word, self.dispatch(op))
            },

            Err(_) => {
                self.regs.set_pc(pc.wrapping_add(1));
                (0, Err(InstructionFault::AddressError))
            },
        };

        if let Some(target) = delay_slot_target {
            trace!(target: "UNIT", "{} branch to ${:08X}", self.id, target);
            self.regs.set_pc(target);
        }

        self.retired += 1;

        result.map_err(|kind| Fault {
            kind: kind,
            word: word,
            unit: self.id,
            pc  : pc,
        })
    }

    fn dispatch(&mut self, op: Operation) -> Result<(), InstructionFault> {
        use Operation::*;

        if op.is_doubleword() && !self.mode.doubleword_enabled() {
            return Err(InstructionFault::ReservedInstruction);
        }

        match op {
            Sll     => self.special_sll(),
            Srl     => self.special_srl(),
            Sra     => self.special_sra(),
            Jr      => self.special_jr(),
            Break   => self.special_break(),
            Add     => self.special_add(),
            Addu    => self.special_addu(),
            Subu    => self.special_subu(),
            And     => self.special_and(),
            Or      => self.special_or(),
            Dadd    => self.special_dadd(),
            Daddu   => self.special_daddu(),

            Bltz    => self.regimm_bltz(),
            Bgez    => self.regimm_bgez(),
            Bltzl   => self.regimm_bltzl(),
            Bgezl   => self.regimm_bgezl(),
            Bltzal  => self.regimm_bltzal(),
            Bgezal  => self.regimm_bgezal(),
            Bltzall => self.regimm_bltzall(),
            Bgezall => self.regimm_bgezall(),

            J       => self.inst_j(),
            Jal     => self.inst_jal(),
            Beq     => self.inst_beq(),
            Bne     => self.inst_bne(),
            Blez    => self.inst_blez(),
            Bgtz    => self.inst_bgtz(),
            Addi    => self.inst_addi(),
            Addiu   => self.inst_addiu(),
            Andi    => self.inst_andi(),
            Ori     => self.inst_ori(),
            Lui     => self.inst_lui(),
            Beql    => self.inst_beql(),
            Bnel    => self.inst_bnel(),
            Blezl   => self.inst_blezl(),
            Bgtzl   => self.inst_bgtzl(),
            Daddi   => self.inst_daddi(),
            Daddiu  => self.inst_daddiu(),
            Cache   => self.inst_cache(),

            Cop { z, op } => self.inst_cop(z, op),

            Unknown => self.inst_unknown(),
        }
    }

    #[inline(always)]
    fn rs(&self) -> u64 {
        self.regs.read(self.inst.rs)
    }

    #[inline(always)]
    fn rt(&self) -> u64 {
        self.regs.read(self.inst.rt)
    }

    #[inline(always)]
    fn branch(&mut self, condition: bool) {
        if condition {
            // target is the index of the delay slot instruction
            // plus the sign extended and left-shifted immediate offset
            let target = self.regs.pc().wrapping_add(sign_extend_16(self.inst.imm) << 2);
            self.branch_latch = Some(target);
        }
    }

    // branch likely instructions discard the delay slot when the branch is not taken
    #[inline(always)]
    fn branch_likely(&mut self, condition: bool) {
        if condition {
            self.branch(true);
        } else {
            // pc points at the delay slot, step over it
            self.regs.set_pc(self.regs.pc().wrapping_add(1));
        }
    }

    // the return address is the instruction after the delay slot
    #[inline(always)]
    fn link(&mut self) {
        let return_index = self.regs.pc().wrapping_add(1);
        self.regs.write(RA, return_index as u64);
    }

    fn inst_unknown(&mut self) -> Result<(), InstructionFault> {
        Err(InstructionFault::UnknownInstruction)
    }

    fn inst_addi(&mut self) -> Result<(), InstructionFault> {
        // integer overflow exception occurs with ADDI, unlike ADDIU
        let result = trapping_add(self.rs() as u32 as i32, self.inst.signed_imm() as i32)?;
        self.regs.write(self.inst.rt, result as i64 as u64);
        Ok(())
    }

    fn inst_addiu(&mut self) -> Result<(), InstructionFault> {
        // no integer overflow exception occurs with ADDIU
        let result = (self.rs() as u32).wrapping_add(self.inst.signed_imm());
        self.regs.write(self.inst.rt, result as i32 as u64);
        Ok(())
    }

    fn inst_andi(&mut self) -> Result<(), InstructionFault> {
        // immediate is zero extended
        self.regs.write(self.inst.rt, self.rs() & (self.inst.imm as u64));
        Ok(())
    }

    fn inst_ori(&mut self) -> Result<(), InstructionFault> {
        self.regs.write(self.inst.rt, self.rs() | (self.inst.imm as u64));
        Ok(())
    }

    fn inst_lui(&mut self) -> Result<(), InstructionFault> {
        self.regs.write(self.inst.rt, (((self.inst.imm as u32) << 16) as i32) as u64);
        Ok(())
    }

    fn inst_daddi(&mut self) -> Result<(), InstructionFault> {
        let result = trapping_add(self.rs() as i64, self.inst.signed_imm64() as i64)?;
        self.regs.write(self.inst.rt, result as u64);
        Ok(())
    }

    fn inst_daddiu(&mut self) -> Result<(), InstructionFault> {
        self.regs.write(self.inst.rt, self.rs().wrapping_add(self.inst.signed_imm64()));
        Ok(())
    }

    fn inst_beq(&mut self) -> Result<(), InstructionFault> {
        let condition = self.rs() == self.rt();
        self.branch(condition);
        Ok(())
    }

    fn inst_beql(&mut self) -> Result<(), InstructionFault> {
        let condition = self.rs() == self.rt();
        self.branch_likely(condition);
        Ok(())
    }

    fn inst_bne(&mut self) -> Result<(), InstructionFault> {
        let condition = self.rs() != self.rt();
        self.branch(condition);
        Ok(())
    }

    fn inst_bnel(&mut self) -> Result<(), InstructionFault> {
        let condition = self.rs() != self.rt();
        self.branch_likely(condition);
        Ok(())
    }

    fn inst_bgtz(&mut self) -> Result<(), InstructionFault> {
        let condition = (self.rs() as i64) > 0;
        self.branch(condition);
        Ok(())
    }

    fn inst_bgtzl(&mut self) -> Result<(), InstructionFault> {
        let condition = (self.rs() as i64) > 0;
        self.branch_likely(condition);
        Ok(())
    }

    fn inst_blez(&mut self) -> Result<(), InstructionFault> {
        let condition = (self.rs() as i64) <= 0;
        self.branch(condition);
        Ok(())
    }

    fn inst_blezl(&mut self) -> Result<(), InstructionFault> {
        let condition = (self.rs() as i64) <= 0;
        self.branch_likely(condition);
        Ok(())
    }

    fn inst_j(&mut self) -> Result<(), InstructionFault> {
        // the target replaces the low 26 bits of the delay slot index
        let dest = (self.regs.pc() & 0x3C00_0000) | self.inst.target;
        self.branch_latch = Some(dest);
        Ok(())
    }

    fn inst_jal(&mut self) -> Result<(), InstructionFault> {
        self.link();
        self.inst_j()
    }

    fn inst_cache(&mut self) -> Result<(), InstructionFault> {
        // there is no cache to operate on
        Ok(())
    }

    fn inst_cop(&mut self, z: u8, op: CopOp) -> Result<(), InstructionFault> {
        // coprocessors are not emulated. move, control, condition branch and function
        // forms are routed here and have no effect
        debug!(target: "UNIT", "{} COP{} {:?} not implemented (${:08X})", self.id, z, op, self.inst.v);
        Ok(())
    }

    fn regimm_bgez(&mut self) -> Result<(), InstructionFault> {
        let condition = (self.rs() as i64) >= 0;
        self.branch(condition);
        Ok(())
    }

    fn regimm_bgezl(&mut self) -> Result<(), InstructionFault> {
        let condition = (self.rs() as i64) >= 0;
        self.branch_likely(condition);
        Ok(())
    }

    fn regimm_bgezal(&mut self) -> Result<(), InstructionFault> {
        // unconditionally, the index after the delay slot is stored in the link register,
        // and that happens before rs is tested
        self.link();
        let condition = (self.rs() as i64) >= 0;
        self.branch(condition);
        Ok(())
    }

    fn regimm_bgezall(&mut self) -> Result<(), InstructionFault> {
        self.link();
        let condition = (self.rs() as i64) >= 0;
        self.branch_likely(condition);
        Ok(())
    }

    fn regimm_bltz(&mut self) -> Result<(), InstructionFault> {
        let condition = (self.rs() as i64) < 0;
        self.branch(condition);
        Ok(())
    }

    fn regimm_bltzl(&mut self) -> Result<(), InstructionFault> {
        let condition = (self.rs() as i64) < 0;
        self.branch_likely(condition);
        Ok(())
    }

    fn regimm_bltzal(&mut self) -> Result<(), InstructionFault> {
        self.link();
        let condition = (self.rs() as i64) < 0;
        self.branch(condition);
        Ok(())
    }

    fn regimm_bltzall(&mut self) -> Result<(), InstructionFault> {
        self.link();
        let condition = (self.rs() as i64) < 0;
        self.branch_likely(condition);
        Ok(())
    }

    fn special_add(&mut self) -> Result<(), InstructionFault> {
        // add does cause an overflow exception, and rd is left untouched when it does
        let result = trapping_add(self.rs() as u32 as i32, self.rt() as u32 as i32)?;
        self.regs.write(self.inst.rd, result as i64 as u64);
        Ok(())
    }

    fn special_addu(&mut self) -> Result<(), InstructionFault> {
        // addu does not cause an overflow exception
        let result = (self.rs() as u32).wrapping_add(self.rt() as u32);
        self.regs.write(self.inst.rd, result as i32 as u64);
        Ok(())
    }

    fn special_subu(&mut self) -> Result<(), InstructionFault> {
        let result = (self.rs() as u32).wrapping_sub(self.rt() as u32);
        self.regs.write(self.inst.rd, result as i32 as u64);
        Ok(())
    }

    fn special_and(&mut self) -> Result<(), InstructionFault> {
        self.regs.write(self.inst.rd, self.rs() & self.rt());
        Ok(())
    }

    fn special_or(&mut self) -> Result<(), InstructionFault> {
        self.regs.write(self.inst.rd, self.rs() | self.rt());
        Ok(())
    }

    fn special_dadd(&mut self) -> Result<(), InstructionFault> {
        let result = trapping_add(self.rs() as i64, self.rt() as i64)?;
        self.regs.write(self.inst.rd, result as u64);
        Ok(())
    }

    fn special_daddu(&mut self) -> Result<(), InstructionFault> {
        self.regs.write(self.inst.rd, self.rs().wrapping_add(self.rt()));
        Ok(())
    }

    fn special_sll(&mut self) -> Result<(), InstructionFault> {
        // 32-bit shift and sign extended into 64 bits
        let result = (self.rt() as u32) << self.inst.sa;
        self.regs.write(self.inst.rd, result as i32 as u64);
        Ok(())
    }

    fn special_srl(&mut self) -> Result<(), InstructionFault> {
        let result = (self.rt() as u32) >> self.inst.sa;
        self.regs.write(self.inst.rd, result as i32 as u64);
        Ok(())
    }

    fn special_sra(&mut self) -> Result<(), InstructionFault> {
        // truncate to u32, convert to signed, shift (fills 1s in the upper bits) and sign extend to u64
        let result = (self.rt() as u32 as i32) >> self.inst.sa;
        self.regs.write(self.inst.rd, result as i64 as u64);
        Ok(())
    }

    fn special_jr(&mut self) -> Result<(), InstructionFault> {
        self.branch_latch = Some(self.rs() as u32);
        Ok(())
    }

    fn special_break(&mut self) -> Result<(), InstructionFault> {
        debug!(target: "UNIT", "{} break code=${:05X}", self.id, (self.inst.v >> 6) & 0xF_FFFF);
        self.break_hit = true;
        Ok(())
    }
}

/// Signed add that reports overflow instead of wrapping. Overflow happens when both
/// addends have the same sign and the sum's sign differs from theirs.
#[inline(always)]
fn trapping_add<N: PrimInt + Signed + WrappingAdd>(a: N, b: N) -> Result<N, InstructionFault> {
    let result = a.wrapping_add(&b);
    if (!(a ^ b) & (a ^ result)) < N::zero() {
        Err(InstructionFault::ArithmeticOverflow)
    } else {
        Ok(result)
    }
}
