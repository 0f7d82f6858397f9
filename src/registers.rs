/// General purpose register file and program counter owned by one execution unit.
///
/// The PC is a word index into shared memory, not a byte address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    gpr: [u64; 32],
    pc: u32,
}

impl RegisterFile {
    pub fn new(pc: u32) -> RegisterFile {
        RegisterFile {
            gpr: [0u64; 32],
            pc : pc,
        }
    }

    pub fn reset(&mut self, pc: u32) {
        self.gpr = [0u64; 32];
        self.pc = pc;
    }

    #[inline(always)]
    pub fn read(&self, index: usize) -> u64 {
        self.gpr[index]
    }

    /// r0 is hard-wired to zero, writes to it are dropped
    #[inline(always)]
    pub fn write(&mut self, index: usize, value: u64) {
        if index != 0 {
            self.gpr[index] = value;
        }
    }

    pub fn regs(&self) -> &[u64; 32] {
        &self.gpr
    }

    #[inline(always)]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    #[inline(always)]
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    pub fn abi_name(index: usize) -> &'static str {
        const NAMES: [&str; 32] = [
            "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3",
            "t0"  , "t1", "t2", "t3", "t4", "t5", "t6", "t7",
            "s0"  , "s1", "s2", "s3", "s4", "s5", "s6", "s7",
            "t8"  , "t9", "k0", "k1", "gp", "sp", "fp", "ra",
        ];
        NAMES[index & 0x1F]
    }
}
