use crate::decode::{CopOp, InstructionDecode, Operation};

/// Render one instruction as text. Never fails; anything unrecognised renders as a `.word`.
pub fn disassemble(inst: &InstructionDecode, op: Operation) -> String {
    use Operation::*;

    let mnemonic = op.mnemonic();

    match op {
        // sll r0, r0, 0
        Sll if inst.v == 0 => String::from("nop"),

        Sll | Srl | Sra => format!("{} r{}, r{}, {}", mnemonic, inst.rd, inst.rt, inst.sa),

        Add | Addu | Subu | And | Or | Dadd | Daddu => {
            format!("{} r{}, r{}, r{}", mnemonic, inst.rd, inst.rs, inst.rt)
        },

        Jr => format!("{} r{}", mnemonic, inst.rs),

        Break => {
            let code = (inst.v >> 6) & 0xF_FFFF;
            if code == 0 {
                String::from(mnemonic)
            } else {
                format!("{} ${:05X}", mnemonic, code)
            }
        },

        Addi | Addiu | Andi | Ori | Daddi | Daddiu => {
            format!("{} r{}, r{}, ${:04X}", mnemonic, inst.rt, inst.rs, inst.imm)
        },

        Lui => format!("{} r{}, ${:04X}", mnemonic, inst.rt, inst.imm),

        Beq | Bne | Beql | Bnel => {
            format!("{} r{}, r{}, ${:04X}", mnemonic, inst.rs, inst.rt, inst.imm)
        },

        Blez | Bgtz | Blezl | Bgtzl
            | Bltz | Bgez | Bltzl | Bgezl | Bltzal | Bgezal | Bltzall | Bgezall => {
            format!("{} r{}, ${:04X}", mnemonic, inst.rs, inst.imm)
        },

        J | Jal => format!("{} ${:07X}", mnemonic, inst.target),

        Cache => format!("{} ${:02X}, ${:04X}(r{})", mnemonic, inst.rt, inst.imm, inst.rs),

        Cop { z, op: cop } => match cop {
            CopOp::Mfc | CopOp::Dmfc | CopOp::Cfc | CopOp::Mtc | CopOp::Dmtc | CopOp::Ctc => {
                format!("{}{} r{}, r{}", mnemonic, z, inst.rt, inst.rd)
            },

            // bcf/bct/bcfl/bctl take the coprocessor number after "bc"
            CopOp::Bcf | CopOp::Bct | CopOp::Bcfl | CopOp::Bctl => {
                format!("bc{}{} ${:04X}", z, &mnemonic[2..], inst.imm)
            },

            CopOp::Function => format!("{}{} ${:07X}", mnemonic, z, inst.v & 0x01FF_FFFF),
        },

        Unknown => format!("{} ${:08X}", mnemonic, inst.v),
    }
}

/// Decode and render a raw instruction word.
pub fn decode_to_text(word: u32) -> String {
    let inst = InstructionDecode::decode(word);
    disassemble(&inst, Operation::lookup(&inst))
}
