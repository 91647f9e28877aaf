//! Block instructions: single and repeating forms, both drivers, and loops
//! interrupted by a handler that returns with RETI.

use emu_core::SimpleBus;
use zilog_z80::{InputSignals, InterruptMode, PF, Z80, ZF};

const IDLE: InputSignals = InputSignals::INACTIVE;

fn setup(program: &[u8]) -> (Z80, SimpleBus) {
    let mut bus = SimpleBus::new();
    bus.load(0x0000, program);
    (Z80::new(), bus)
}

fn run(cpu: &mut Z80, bus: &mut SimpleBus) -> u64 {
    cpu.run_instruction(bus, IDLE).get()
}

#[test]
fn ldir_one_iteration_per_instruction() {
    let (mut cpu, mut bus) = setup(&[0xED, 0xB0, 0x76]); // LDIR; HALT
    bus.load(0x4000, &[1, 2, 3]);
    cpu.set_hl(0x4000);
    cpu.set_de(0x5000);
    cpu.set_bc(3);

    assert_eq!(run(&mut cpu, &mut bus), 21);
    assert!(cpu.in_block_loop());
    assert_eq!(cpu.pc(), 0x0000);
    assert_eq!(cpu.bc(), 2);

    assert_eq!(run(&mut cpu, &mut bus), 21);
    assert_eq!(cpu.bc(), 1);

    // Last iteration: no rewind, no extra cycles
    assert_eq!(run(&mut cpu, &mut bus), 16);
    assert!(!cpu.in_block_loop());
    assert_eq!(cpu.pc(), 0x0002);
    assert_eq!(cpu.bc(), 0);
    assert_eq!(cpu.hl(), 0x4003);
    assert_eq!(cpu.de(), 0x5003);
    assert_eq!([bus.peek(0x5000), bus.peek(0x5001), bus.peek(0x5002)], [1, 2, 3]);
    assert_eq!(cpu.f() & PF, 0);
}

#[test]
fn block_driver_drains_loop() {
    let (mut cpu, mut bus) = setup(&[0xED, 0xB8]); // LDDR
    bus.load(0x4000, &[1, 2, 3]);
    cpu.set_hl(0x4002);
    cpu.set_de(0x5002);
    cpu.set_bc(3);

    let cycles = cpu.run_instruction_with_block(&mut bus, IDLE).get();
    assert_eq!(cycles, 21 + 21 + 16);
    assert_eq!(cpu.pc(), 0x0002);
    assert_eq!(cpu.hl(), 0x3FFF);
    assert_eq!([bus.peek(0x5000), bus.peek(0x5001), bus.peek(0x5002)], [1, 2, 3]);
}

#[test]
fn cpir_stops_on_match() {
    let (mut cpu, mut bus) = setup(&[0xED, 0xB1]); // CPIR
    bus.load(0x4000, &[1, 2, 3, 4]);
    cpu.set_hl(0x4000);
    cpu.set_bc(4);
    cpu.set_a(3);

    let cycles = cpu.run_instruction_with_block(&mut bus, IDLE).get();
    assert_eq!(cycles, 21 + 21 + 16);
    assert_eq!(cpu.hl(), 0x4003);
    assert_eq!(cpu.bc(), 1);
    assert_eq!(cpu.f() & (ZF | PF), ZF | PF);
}

#[test]
fn otir_uses_decremented_b_for_port() {
    let (mut cpu, mut bus) = setup(&[0xED, 0xB3]); // OTIR
    bus.load(0x4000, &[0xAA, 0xBB]);
    cpu.set_hl(0x4000);
    cpu.set_bc(0x0210);

    let cycles = cpu.run_instruction_with_block(&mut bus, IDLE).get();
    assert_eq!(cycles, 21 + 16);
    assert_eq!(bus.port_writes(), &[(0x0110, 0xAA), (0x0010, 0xBB)]);
    assert_eq!(cpu.bc(), 0x0010);
    assert_eq!(cpu.f() & ZF, ZF);
}

#[test]
fn inir_reads_port_before_decrement() {
    let (mut cpu, mut bus) = setup(&[0xED, 0xB2]); // INIR
    bus.set_port(0x0220, 0x11);
    bus.set_port(0x0120, 0x22);
    cpu.set_hl(0x4000);
    cpu.set_bc(0x0220);

    let cycles = cpu.run_instruction_with_block(&mut bus, IDLE).get();
    assert_eq!(cycles, 21 + 16);
    assert_eq!([bus.peek(0x4000), bus.peek(0x4001)], [0x11, 0x22]);
    assert_eq!(cpu.hl(), 0x4002);
}

#[test]
fn repeat_costs_five_more_than_single() {
    // (single, repeating) opcode pairs
    let pairs = [
        (0xA0, 0xB0),
        (0xA8, 0xB8),
        (0xA1, 0xB1),
        (0xA9, 0xB9),
        (0xA2, 0xB2),
        (0xAA, 0xBA),
        (0xA3, 0xB3),
        (0xAB, 0xBB),
    ];

    for (single, repeat) in pairs {
        let prepare = |opcode: u8, bc: u16| {
            let (mut cpu, bus) = setup(&[0xED, opcode]);
            cpu.set_hl(0x4000);
            cpu.set_de(0x5000);
            cpu.set_bc(bc);
            cpu.set_a(0xFF); // never matches the zeroed memory
            (cpu, bus)
        };

        let (mut cpu, mut bus) = prepare(single, 0x0505);
        let single_cycles = run(&mut cpu, &mut bus);
        assert_eq!(cpu.pc(), 0x0002);

        let (mut cpu, mut bus) = prepare(repeat, 0x0505);
        let looping_cycles = run(&mut cpu, &mut bus);
        assert_eq!(looping_cycles, single_cycles + 5, "ED {repeat:02X} looping");
        assert_eq!(cpu.pc(), 0x0000);
        assert!(cpu.in_block_loop());

        // Counter reaches its terminal value: B for I/O forms, BC otherwise
        let last = if repeat & 0x02 != 0 { 0x0101 } else { 0x0001 };
        let (mut cpu, mut bus) = prepare(repeat, last);
        let final_cycles = run(&mut cpu, &mut bus);
        assert_eq!(final_cycles, single_cycles, "ED {repeat:02X} final");
        assert_eq!(cpu.pc(), 0x0002);
        assert!(!cpu.in_block_loop());
    }
}

#[test]
fn interrupted_loop_resumes_after_reti() {
    let (mut cpu, mut bus) = setup(&[0xED, 0xB0, 0x76]); // LDIR; HALT
    bus.load(0x0038, &[0xED, 0x4D]); // RETI
    bus.load(0x4000, &[1, 2, 3]);
    cpu.set_hl(0x4000);
    cpu.set_de(0x5000);
    cpu.set_bc(3);
    cpu.set_sp(0x8000);
    cpu.set_im(InterruptMode::Im1);
    cpu.set_iff(true, true);

    run(&mut cpu, &mut bus);
    assert!(cpu.in_block_loop());

    // Accepted between iterations, returning to the LDIR itself
    cpu.step(&mut bus, InputSignals::asserting(InputSignals::INT));
    assert_eq!(cpu.pc(), 0x0038);
    assert!(!cpu.in_block_loop());
    assert_eq!(bus.peek16(0x7FFE), 0x0000);

    run(&mut cpu, &mut bus);
    assert_eq!(cpu.pc(), 0x0000);
    assert!(cpu.in_block_loop());
    assert_eq!(bus.reti_count(), 1);

    let cycles = cpu.run_instruction_with_block(&mut bus, IDLE).get();
    assert_eq!(cycles, 21 + 16);
    assert_eq!(cpu.bc(), 0);
    assert_eq!(cpu.pc(), 0x0002);
}

#[test]
fn block_transfer_flags() {
    let (mut cpu, mut bus) = setup(&[0xED, 0xA0]); // LDI
    bus.poke(0x4000, 0x02);
    cpu.set_hl(0x4000);
    cpu.set_de(0x5000);
    cpu.set_bc(2);
    cpu.set_a(0x00);
    cpu.set_f(0xFF);

    run(&mut cpu, &mut bus);
    // S, Z, C kept; H, N cleared; Y from bit 1 of A + value; P/V as BC != 0
    assert_eq!(cpu.f(), 0xC1 | 0x20 | PF);
}
