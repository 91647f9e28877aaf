//! Data-driven tests in the `SingleStepTests` JSON layout.
//!
//! Each case gives the register file and touched memory before and after one
//! instruction, plus its cycle count and any port traffic. Fields left out of
//! a state default to zero.

use emu_core::SimpleBus;
use serde::Deserialize;
use zilog_z80::{RegisterBank, Registers, Z80};

const FIXTURES: &str = include_str!("data/fixtures.json");

#[derive(Deserialize)]
struct TestCase {
    name: String,
    initial: CpuState,
    #[serde(rename = "final")]
    final_state: CpuState,
    cycles: u64,
    #[serde(default)]
    ports: Vec<(u16, u8, String)>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CpuState {
    pc: u16,
    sp: u16,
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    f: u8,
    h: u8,
    l: u8,
    i: u8,
    r: u8,
    ix: u16,
    iy: u16,
    #[serde(rename = "af_")]
    af_alt: u16,
    #[serde(rename = "bc_")]
    bc_alt: u16,
    #[serde(rename = "de_")]
    de_alt: u16,
    #[serde(rename = "hl_")]
    hl_alt: u16,
    iff1: u8,
    iff2: u8,
    im: u8,
    ram: Vec<(u16, u8)>,
}

impl CpuState {
    fn registers(&self) -> Registers {
        let main = RegisterBank {
            a: self.a,
            f: self.f,
            b: self.b,
            c: self.c,
            d: self.d,
            e: self.e,
            h: self.h,
            l: self.l,
        };
        let mut shadow = RegisterBank::default();
        shadow.set_af(self.af_alt);
        shadow.set_bc(self.bc_alt);
        shadow.set_de(self.de_alt);
        shadow.set_hl(self.hl_alt);

        Registers {
            main,
            shadow,
            ix: self.ix,
            iy: self.iy,
            sp: self.sp,
            pc: self.pc,
            i: self.i,
            r: self.r,
            iff1: self.iff1 != 0,
            iff2: self.iff2 != 0,
            ..Registers::default()
        }
    }
}

fn setup(case: &TestCase) -> (Z80, SimpleBus) {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();

    for &(address, value) in &case.initial.ram {
        bus.poke(address, value);
    }
    for (port, value, direction) in &case.ports {
        if direction == "r" {
            bus.set_port(*port, *value);
        }
    }

    *cpu.registers_mut() = case.initial.registers();
    cpu.set_im_raw(case.initial.im)
        .unwrap_or_else(|e| panic!("{}: {e}", case.name));
    (cpu, bus)
}

/// Compare the CPU and bus against the expected state, returning mismatches.
fn compare(cpu: &Z80, bus: &SimpleBus, case: &TestCase, cycles: u64) -> Vec<String> {
    let expected = &case.final_state;
    let mut errors = Vec::new();

    let actual = *cpu.registers();
    let wanted = Registers {
        im: actual.im,
        ..expected.registers()
    };
    if actual != wanted {
        errors.push(format!("registers: expected {wanted:?}, got {actual:?}"));
    }
    if cpu.im().as_u8() != expected.im {
        errors.push(format!("IM: expected {}, got {}", expected.im, cpu.im()));
    }

    for &(address, value) in &expected.ram {
        let got = bus.peek(address);
        if got != value {
            errors.push(format!("RAM[{address:04X}]: expected {value:02X}, got {got:02X}"));
        }
    }

    let writes: Vec<(u16, u8)> = case
        .ports
        .iter()
        .filter(|(_, _, direction)| direction == "w")
        .map(|&(port, value, _)| (port, value))
        .collect();
    if bus.port_writes() != writes.as_slice() {
        errors.push(format!(
            "port writes: expected {writes:?}, got {:?}",
            bus.port_writes()
        ));
    }

    if cycles != case.cycles {
        errors.push(format!("cycles: expected {}, got {cycles}", case.cycles));
    }
    errors
}

#[test]
fn fixtures() {
    let cases: Vec<TestCase> = serde_json::from_str(FIXTURES).expect("fixture JSON");
    assert!(!cases.is_empty());

    let mut failures = Vec::new();
    for case in &cases {
        let (mut cpu, mut bus) = setup(case);
        let cycles = cpu
            .run_instruction(&mut bus, zilog_z80::InputSignals::INACTIVE)
            .get();

        let errors = compare(&cpu, &bus, case, cycles);
        if !errors.is_empty() {
            failures.push(format!("{}:\n  {}", case.name, errors.join("\n  ")));
        }
    }

    assert!(
        failures.is_empty(),
        "{} of {} fixtures failed:\n{}",
        failures.len(),
        cases.len(),
        failures.join("\n")
    );
}
