mod common;

use n64_interp::*;
use rstest::rstest;

use common::*;

#[test]
fn one_round_without_branches() {
    let mut mach = machine(&[], 0x100, 0x80);
    let faults = mach.run_round();

    assert!(faults.is_empty());
    assert_eq!(mach.cpu().pc(), CPU_STEPS_PER_ROUND);
    assert_eq!(mach.rcp().pc(), 0x80 + RCP_STEPS_PER_ROUND);
}

#[test]
fn free_function_round() {
    let mut mem = SharedMemory::new(32);
    let mut cpu = ExecutionUnit::new(UnitId::Cpu, ModeFlags::default(), 0);
    let mut rcp = ExecutionUnit::new(UnitId::Rcp, ModeFlags::default(), 16);

    let faults = run_round(&mut cpu, &mut rcp, &mut mem);
    assert!(faults.is_empty());
    assert_eq!((cpu.pc(), rcp.pc()), (3, 18));
}

#[test]
fn beq_through_the_scheduler() {
    // beq r0, r0, 2 ; addiu r1, r1, 1 (delay slot) ; target is 1 + 8 = 9
    let mut program = vec![beq(0, 0, 2), addiu(1, 1, 1)];
    program.resize(9, NOP);
    program.push(addiu(2, 0, 0x42));

    let mut mach = machine(&program, 0x40, 0x30);
    mach.run_round();
    // beq, delay slot, then the target
    assert_eq!(mach.cpu().regs().read(1), 1);
    assert_eq!(mach.cpu().regs().read(2), 0x42);
    assert_eq!(mach.cpu().pc(), 10);
}

#[test]
fn branch_latch_survives_round_boundary() {
    // the branch is the third CPU step, so its delay slot runs in the next round
    let program = [NOP, NOP, beq(0, 0, 1), addiu(1, 1, 1)];
    let mut mach = machine(&program, 0x40, 0x30);

    mach.run_round();
    assert_eq!(mach.cpu().pc(), 3);
    assert_eq!(mach.cpu().pending_branch(), Some(3 + 4));
    // the RCP is unaffected by the CPU's latch
    assert_eq!(mach.rcp().pending_branch(), None);

    mach.run_round();
    assert_eq!(mach.cpu().regs().read(1), 1);
    // delay slot at 3 then two NOPs from 7
    assert_eq!(mach.cpu().pc(), 9);
}

#[rstest]
#[case::beq_taken(beq(1, 1, 4), 0, true, false)]
#[case::beq_not_taken(beq(1, 0, 4), 5, false, false)]
#[case::bne_taken(i_type(0b000_101, 1, 0, 4), 5, true, false)]
#[case::blez_taken(i_type(0b000_110, 1, 0, 4), -1i64 as u64, true, false)]
#[case::bgtz_not_taken(i_type(0b000_111, 1, 0, 4), 0, false, false)]
#[case::bltz_taken(regimm(0b00_000, 1, 4), -3i64 as u64, true, false)]
#[case::bgez_taken(regimm(0b00_001, 1, 4), 0, true, false)]
#[case::beql_taken(i_type(0b010_100, 1, 1, 4), 0, true, true)]
#[case::bnel_not_taken(i_type(0b010_101, 1, 1, 4), 0, false, true)]
#[case::blezl_not_taken(i_type(0b010_110, 1, 0, 4), 1, false, true)]
#[case::bgtzl_taken(i_type(0b010_111, 1, 0, 4), 9, true, true)]
#[case::bltzl_not_taken(regimm(0b00_010, 1, 4), 0, false, true)]
#[case::bgezl_taken(regimm(0b00_011, 1, 4), 0, true, true)]
fn branch_outcomes(#[case] branch: u32, #[case] r1: u64, #[case] taken: bool, #[case] likely: bool) {
    let (mut unit, mut mem) = unit(&[branch, addiu(3, 3, 1)]);
    unit.regs_mut().write(1, r1);

    unit.execute(&mut mem).unwrap();
    if taken || !likely {
        // the delay slot is next
        assert_eq!(unit.pc(), 1);
        unit.execute(&mut mem).unwrap();
        assert_eq!(unit.regs().read(3), 1);
    } else {
        // annulled: the branch index plus two
        assert_eq!(unit.pc(), 2);
        assert_eq!(unit.regs().read(3), 0);
    }

    let expected = if taken { 1 + (4 << 2) } else { 2 };
    assert_eq!(unit.pc(), expected);
}

#[rstest]
#[case::bltzal(0b10_000, 1u64, false)]
#[case::bgezal(0b10_001, 1u64, true)]
#[case::bltzall(0b10_010, 1u64, false)]
#[case::bgezall(0b10_011, -1i64 as u64, false)]
fn link_branches_write_r31(#[case] rt: u32, #[case] r1: u64, #[case] taken: bool) {
    let (mut unit, mut mem) = unit(&[regimm(rt, 1, 8)]);
    unit.regs_mut().write(1, r1);

    unit.execute(&mut mem).unwrap();
    assert_eq!(unit.regs().read(31), 2);
    assert_eq!(unit.pending_branch().is_some(), taken);
}

#[test]
fn r0_discarded_on_both_units() {
    let program = [addiu(0, 0, 0x1234), addu(0, 0, 0), addiu(0, 0, 0xFFFF)];
    let mut mach = machine(&program, 0x20, 0);

    mach.run_round();
    assert_eq!(mach.cpu().regs().read(0), 0);
    assert_eq!(mach.rcp().regs().read(0), 0);
}

#[test]
fn unknown_word_faults_exactly_once() {
    let mut mach = machine(&[NOP, 0xFC00_0000], 0x20, 0x10);
    let regs_before = mach.cpu().regs().regs().clone();
    let memory_before = mach.memory().clone();

    let faults = mach.run_round();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].kind, InstructionFault::UnknownInstruction);
    assert_eq!(faults[0].unit, UnitId::Cpu);
    assert_eq!(faults[0].pc, 1);
    assert_eq!(faults[0].word, 0xFC00_0000);

    assert_eq!(mach.cpu().regs().regs(), &regs_before);
    assert_eq!(mach.memory(), &memory_before);
    assert_eq!(mach.cpu().pc(), 3);
    assert_eq!(mach.diagnostics().count(UnitId::Cpu, InstructionFault::UnknownInstruction), 1);
}

#[test]
fn doubleword_reserved_in_user_mode() {
    let daddu = r_type(0x2D, 1, 2, 3);
    let user = ModeFlags { sixty_four_bit: false, kernel: false };
    let settings = Settings { cpu_mode: user, rcp_mode: user, rcp_start_pc: 0x10, ..Settings::default() };
    let mut words = vec![daddu; 3];
    words.resize(0x20, NOP);
    let mut mach = Machine::new(SystemCommunication::new(), settings, SharedMemory::from_words(words));

    let faults = mach.run_round();
    assert_eq!(faults.len(), 3);
    assert!(faults.iter().all(|f| f.kind == InstructionFault::ReservedInstruction));
    assert_eq!(mach.diagnostics().count(UnitId::Cpu, InstructionFault::ReservedInstruction), 3);
}

#[test]
fn fetch_past_memory_is_an_address_error() {
    let mut mach = machine(&[], 4, 3);
    let faults = mach.run_round();

    // the RCP walks off the end on its second step
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].kind, InstructionFault::AddressError);
    assert_eq!((faults[0].unit, faults[0].pc), (UnitId::Rcp, 4));
    assert_eq!(mach.rcp().pc(), 5);
}

#[test]
fn same_program_same_fingerprint() {
    let program = [addiu(1, 0, 7), add(2, 1, 1), addi(3, 2, 0xFFFF), beq(0, 0, 1), addu(4, 3, 1)];
    let mut a = machine(&program, 0x40, 2);
    let mut b = machine(&program, 0x40, 2);

    a.run(12);
    b.run(12);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.total_rounds(), 12);
}
