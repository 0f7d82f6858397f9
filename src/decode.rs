// Instruction word decode and operation lookup
//
// Every 32-bit word decodes to a field set, and every field set classifies to an
// Operation (possibly Operation::Unknown). Both execution and disassembly dispatch
// on the same Operation so the two can never disagree about what a word means.

/// Raw fields of one instruction word. Fields are always extracted mask-then-shift.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstructionDecode {
    pub v : u32,    // full 32-bit instruction
    pub op: u32,    // 6-bit opcode field

    // rd, rs, and rt are mostly used to index into the register file, so they are usize
    // but they are 5 bits in the instruction
    pub rs: usize,
    pub rt: usize,
    pub rd: usize,

    // 5 bit shift amount
    pub sa: u32,

    // 6-bit special function
    pub funct: u32,

    // 16-bit immediate, sign extended on use
    pub imm: u16,

    // 26-bit jump target
    pub target: u32,
}

impl InstructionDecode {
    pub fn decode(word: u32) -> InstructionDecode {
        InstructionDecode {
            v     : word,
            op    : (word & 0xFC00_0000) >> 26,
            rs    : ((word & 0x03E0_0000) >> 21) as usize,
            rt    : ((word & 0x001F_0000) >> 16) as usize,
            rd    : ((word & 0x0000_F800) >> 11) as usize,
            sa    : (word & 0x0000_07C0) >> 6,
            funct : word & 0x0000_003F,
            imm   : (word & 0x0000_FFFF) as u16,
            target: word & 0x03FF_FFFF,
        }
    }

    #[inline(always)]
    pub fn signed_imm(&self) -> u32 {
        sign_extend_16(self.imm)
    }

    #[inline(always)]
    pub fn signed_imm64(&self) -> u64 {
        sign_extend_16_64(self.imm)
    }
}

pub fn decode(word: u32) -> InstructionDecode {
    InstructionDecode::decode(word)
}

/// Sign extend a 16-bit immediate to 32 bits.
#[inline(always)]
pub fn sign_extend_16(v: u16) -> u32 {
    ((v as i16) as i32) as u32
}

/// Sign extend a 16-bit immediate to the full 64-bit register width.
#[inline(always)]
pub fn sign_extend_16_64(v: u16) -> u64 {
    ((v as i16) as i64) as u64
}

/// Coprocessor sub-operations. None of these have architectural effect yet; the
/// execution unit only routes to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopOp {
    Mfc,
    Dmfc,
    Cfc,
    Mtc,
    Dmtc,
    Ctc,
    Bcf,
    Bct,
    Bcfl,
    Bctl,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    // special
    Sll, Srl, Sra, Jr, Break, Add, Addu, Subu, And, Or, Dadd, Daddu,

    // regimm
    Bltz, Bgez, Bltzl, Bgezl, Bltzal, Bgezal, Bltzall, Bgezall,

    // primary
    J, Jal, Beq, Bne, Blez, Bgtz, Addi, Addiu, Andi, Ori, Lui,
    Beql, Bnel, Blezl, Bgtzl, Daddi, Daddiu, Cache,

    // COP0..COP3
    Cop { z: u8, op: CopOp },

    Unknown,
}

// The special, regimm and COPz rows of the primary table are decoded by Operation::lookup
// before the table is consulted, so they hold Unknown here.
const INSTRUCTION_TABLE: [Operation; 64] = {
    use Operation::*;
    [
        //        _000     _001     _010     _011     _100     _101     _110     _111
    /* 000_ */    Unknown, Unknown, J      , Jal    , Beq    , Bne    , Blez   , Bgtz   ,
    /* 001_ */    Addi   , Addiu  , Unknown, Unknown, Andi   , Ori    , Unknown, Lui    ,
    /* 010_ */    Unknown, Unknown, Unknown, Unknown, Beql   , Bnel   , Blezl  , Bgtzl  ,
    /* 011_ */    Daddi  , Daddiu , Unknown, Unknown, Unknown, Unknown, Unknown, Unknown,
    /* 100_ */    Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown,
    /* 101_ */    Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Cache  ,
    /* 110_ */    Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown,
    /* 111_ */    Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown,
    ]
};

const SPECIAL_TABLE: [Operation; 64] = {
    use Operation::*;
    [
        //        _000     _001     _010     _011     _100     _101     _110     _111
    /* 000_ */    Sll    , Unknown, Srl    , Sra    , Unknown, Unknown, Unknown, Unknown,
    /* 001_ */    Jr     , Unknown, Unknown, Unknown, Unknown, Break  , Unknown, Unknown,
    /* 010_ */    Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown,
    /* 011_ */    Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown,
    /* 100_ */    Add    , Addu   , Unknown, Subu   , And    , Or     , Unknown, Unknown,
    /* 101_ */    Unknown, Unknown, Unknown, Unknown, Dadd   , Daddu  , Unknown, Unknown,
    /* 110_ */    Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown,
    /* 111_ */    Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown,
    ]
};

const REGIMM_TABLE: [Operation; 32] = {
    use Operation::*;
    [
        //        _000     _001     _010     _011     _100     _101     _110     _111
    /* 00_ */     Bltz   , Bgez   , Bltzl  , Bgezl  , Unknown, Unknown, Unknown, Unknown,
    /* 01_ */     Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown,
    /* 10_ */     Bltzal , Bgezal , Bltzall, Bgezall, Unknown, Unknown, Unknown, Unknown,
    /* 11_ */     Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown, Unknown,
    ]
};

impl Operation {
    pub fn lookup(inst: &InstructionDecode) -> Operation {
        match inst.op {
            0b000_000 => Operation::lookup_special(inst),
            0b000_001 => REGIMM_TABLE[inst.rt],
            0b010_000..=0b010_011 => Operation::lookup_cop(inst),

            // these compare rs against zero and the rt field must be empty
            0b000_110 | 0b000_111 | 0b010_110 | 0b010_111 if inst.rt != 0 => Operation::Unknown,

            op => INSTRUCTION_TABLE[op as usize],
        }
    }

    fn lookup_special(inst: &InstructionDecode) -> Operation {
        let op = SPECIAL_TABLE[inst.funct as usize];

        // shift-class ops and BREAK use bits 10..6, everything else requires them clear
        if op.is_shift_class() || inst.sa == 0 {
            op
        } else {
            Operation::Unknown
        }
    }

    fn lookup_cop(inst: &InstructionDecode) -> Operation {
        let z = (inst.op & 0x03) as u8;

        let op = if inst.sa == 0 && inst.funct == 0 && inst.rs < 0b01_000 {
            match inst.rs {
                0b00_000 => CopOp::Mfc,
                0b00_001 => CopOp::Dmfc,
                0b00_010 => CopOp::Cfc,
                0b00_100 => CopOp::Mtc,
                0b00_101 => CopOp::Dmtc,
                0b00_110 => CopOp::Ctc,
                _ => return Operation::Unknown,
            }
        } else {
            match inst.rs {
                0b01_000 => match inst.rt {
                    0b00_000 => CopOp::Bcf,
                    0b00_001 => CopOp::Bct,
                    0b00_010 => CopOp::Bcfl,
                    0b00_011 => CopOp::Bctl,
                    _ => return Operation::Unknown,
                },
                0b10_000..=0b11_111 => CopOp::Function,
                _ => return Operation::Unknown,
            }
        };

        Operation::Cop { z, op }
    }

    pub fn is_shift_class(&self) -> bool {
        matches!(self, Operation::Sll | Operation::Srl | Operation::Sra | Operation::Break)
    }

    /// True for every operation that can write the pending-branch latch.
    pub fn is_branch(&self) -> bool {
        use Operation::*;
        matches!(self,
            Jr | Bltz | Bgez | Bltzl | Bgezl | Bltzal | Bgezal | Bltzall | Bgezall
            | J | Jal | Beq | Bne | Blez | Bgtz | Beql | Bnel | Blezl | Bgtzl)
    }

    /// Doubleword operations, only legal in 64-bit mode or in 32-bit kernel mode.
    pub fn is_doubleword(&self) -> bool {
        matches!(self, Operation::Dadd | Operation::Daddu | Operation::Daddi | Operation::Daddiu)
    }

    pub fn mnemonic(&self) -> &'static str {
        use Operation::*;
        match self {
            Sll     => "sll",
            Srl     => "srl",
            Sra     => "sra",
            Jr      => "jr",
            Break   => "break",
            Add     => "add",
            Addu    => "addu",
            Subu    => "subu",
            And     => "and",
            Or      => "or",
            Dadd    => "dadd",
            Daddu   => "daddu",
            Bltz    => "bltz",
            Bgez    => "bgez",
            Bltzl   => "bltzl",
            Bgezl   => "bgezl",
            Bltzal  => "bltzal",
            Bgezal  => "bgezal",
            Bltzall => "bltzall",
            Bgezall => "bgezall",
            J       => "j",
            Jal     => "jal",
            Beq     => "beq",
            Bne     => "bne",
            Blez    => "blez",
            Bgtz    => "bgtz",
            Addi    => "addi",
            Addiu   => "addiu",
            Andi    => "andi",
            Ori     => "ori",
            Lui     => "lui",
            Beql    => "beql",
            Bnel    => "bnel",
            Blezl   => "blezl",
            Bgtzl   => "bgtzl",
            Daddi   => "daddi",
            Daddiu  => "daddiu",
            Cache   => "cache",
            Cop { op, .. } => match op {
                CopOp::Mfc      => "mfc",
                CopOp::Dmfc     => "dmfc",
                CopOp::Cfc      => "cfc",
                CopOp::Mtc      => "mtc",
                CopOp::Dmtc     => "dmtc",
                CopOp::Ctc      => "ctc",
                CopOp::Bcf      => "bcf",
                CopOp::Bct      => "bct",
                CopOp::Bcfl     => "bcfl",
                CopOp::Bctl     => "bctl",
                CopOp::Function => "cop",
            },
            Unknown => ".word",
        }
    }
}
