#![allow(dead_code)]

use n64_interp::*;

pub const NOP: u32 = 0;

pub fn r_type(funct: u32, rs: u32, rt: u32, rd: u32) -> u32 {
    (rs << 21) | (rt << 16) | (rd << 11) | funct
}

pub fn i_type(op: u32, rs: u32, rt: u32, imm: u16) -> u32 {
    (op << 26) | (rs << 21) | (rt << 16) | imm as u32
}

pub fn regimm(rt: u32, rs: u32, imm: u16) -> u32 {
    i_type(0b000_001, rs, rt, imm)
}

pub fn add(rd: u32, rs: u32, rt: u32) -> u32 { r_type(0x20, rs, rt, rd) }
pub fn addu(rd: u32, rs: u32, rt: u32) -> u32 { r_type(0x21, rs, rt, rd) }
pub fn addiu(rt: u32, rs: u32, imm: u16) -> u32 { i_type(0b001_001, rs, rt, imm) }
pub fn addi(rt: u32, rs: u32, imm: u16) -> u32 { i_type(0b001_000, rs, rt, imm) }
pub fn beq(rs: u32, rt: u32, imm: u16) -> u32 { i_type(0b000_100, rs, rt, imm) }

/// A machine over `size` words of memory with `program` at index 0 and the RCP starting at `rcp_pc`
pub fn machine(program: &[u32], size: usize, rcp_pc: u32) -> Machine {
    let mut words = program.to_vec();
    words.resize(size, NOP);
    let settings = Settings { rcp_start_pc: rcp_pc, ..Settings::default() };
    Machine::new(SystemCommunication::new(), settings, SharedMemory::from_words(words))
}

/// A lone execution unit at index 0 over `program`
pub fn unit(program: &[u32]) -> (ExecutionUnit, SharedMemory) {
    let mut words = program.to_vec();
    words.resize(64, NOP);
    (ExecutionUnit::new(UnitId::Cpu, ModeFlags::default(), 0), SharedMemory::from_words(words))
}
