//! Instruction execution.
//!
//! Each decode table is a match over the opcode's x/y/z/p/q fields. Handlers
//! charge the clock for every bus access and internal cycle they perform.

use emu_core::IoBus;
use tracing::debug;

use super::Z80;
use crate::alu;
use crate::decode::Opcode;
use crate::flags::{CF, PF, SF, ZF, sz53, sz53p};
use crate::prefix::{Index, Prefix};
use crate::registers::{InterruptMode, Register8};
use crate::signals::OutputSignals;

/// Register operand encoding used by the r and r' fields. 6 is (HL).
const REGISTERS: [Option<Register8>; 8] = [
    Some(Register8::B),
    Some(Register8::C),
    Some(Register8::D),
    Some(Register8::E),
    Some(Register8::H),
    Some(Register8::L),
    None,
    Some(Register8::A),
];

impl Z80 {
    /// Execute one fetched byte in the current prefix context.
    ///
    /// Returns true when the byte completed an instruction, false when it
    /// advanced the prefix state.
    pub(super) fn execute<B: IoBus + ?Sized>(&mut self, bus: &mut B, byte: u8) -> bool {
        self.suppress_interrupts = false;
        self.in_block_loop = false;

        match self.prefix {
            Prefix::None | Prefix::Dd | Prefix::Fd => {
                if let Some(next) = self.prefix.after(byte) {
                    self.prefix = next;
                    self.displacement = None;
                    return false;
                }
                self.execute_main(bus, Opcode::new(byte));
            }
            Prefix::Cb => self.execute_cb(bus, Opcode::new(byte)),
            Prefix::Ed => self.execute_ed(bus, Opcode::new(byte)),
            Prefix::DdCb | Prefix::FdCb => {
                if self.displacement.is_none() {
                    self.displacement = Some(byte);
                    return false;
                }
                self.execute_indexed_cb(bus, Opcode::new(byte));
            }
        }
        true
    }

    // =========================================================================
    // Operand helpers
    // =========================================================================

    /// HL, or IX/IY under a DD/FD prefix.
    fn index_reg(&self) -> u16 {
        match self.prefix.index() {
            Some(Index::Ix) => self.regs.ix,
            Some(Index::Iy) => self.regs.iy,
            None => self.regs.main.hl(),
        }
    }

    fn set_index_reg(&mut self, value: u16) {
        match self.prefix.index() {
            Some(Index::Ix) => self.regs.ix = value,
            Some(Index::Iy) => self.regs.iy = value,
            None => self.regs.main.set_hl(value),
        }
    }

    fn register(r: u8) -> Register8 {
        match REGISTERS[usize::from(r)] {
            Some(reg) => reg,
            None => unreachable!("register field {r} names (HL)"),
        }
    }

    /// Register r with H and L replaced by the index register halves.
    fn reg8(&self, r: u8) -> u8 {
        match (r, self.prefix.index()) {
            (4, Some(_)) => (self.index_reg() >> 8) as u8,
            (5, Some(_)) => self.index_reg() as u8,
            _ => self.regs.main.get(Self::register(r)),
        }
    }

    fn set_reg8(&mut self, r: u8, value: u8) {
        match (r, self.prefix.index()) {
            (4, Some(_)) => self.set_index_reg((self.index_reg() & 0x00FF) | (u16::from(value) << 8)),
            (5, Some(_)) => self.set_index_reg((self.index_reg() & 0xFF00) | u16::from(value)),
            _ => self.regs.main.set(Self::register(r), value),
        }
    }

    /// Register r, never substituted.
    fn plain_reg8(&self, r: u8) -> u8 {
        self.regs.main.get(Self::register(r))
    }

    fn set_plain_reg8(&mut self, r: u8, value: u8) {
        self.regs.main.set(Self::register(r), value);
    }

    /// Address of the (HL) operand, or (IX+d)/(IY+d) under DD/FD.
    ///
    /// The first indexed access fetches d and spends 5 internal cycles; the
    /// displacement is then cached for the rest of the instruction.
    fn operand_address<B: IoBus + ?Sized>(&mut self, bus: &mut B) -> u16 {
        if self.prefix.index().is_none() {
            return self.regs.main.hl();
        }
        let d = match self.displacement {
            Some(d) => d,
            None => {
                let d = self.fetch_byte(bus);
                self.internal(5);
                self.displacement = Some(d);
                d
            }
        };
        self.index_reg().wrapping_add_signed(i16::from(d as i8))
    }

    /// Read operand r, where 6 is the memory operand.
    fn read_operand<B: IoBus + ?Sized>(&mut self, bus: &mut B, r: u8) -> u8 {
        if r == 6 {
            let address = self.operand_address(bus);
            self.read(bus, address)
        } else {
            self.reg8(r)
        }
    }

    /// Read, transform and write back operand r. Memory operands spend one
    /// internal cycle between the read and the write.
    fn read_modify_write<B, F>(&mut self, bus: &mut B, r: u8, op: F)
    where
        B: IoBus + ?Sized,
        F: FnOnce(&mut Self, u8) -> u8,
    {
        if r == 6 {
            let address = self.operand_address(bus);
            let value = self.read(bus, address);
            self.internal(1);
            let result = op(self, value);
            self.write(bus, address, result);
        } else {
            let value = self.reg8(r);
            let result = op(self, value);
            self.set_reg8(r, result);
        }
    }

    /// Register pair from the rp table: BC, DE, HL/IX/IY, SP.
    fn rp(&self, p: u8) -> u16 {
        match p {
            0 => self.regs.main.bc(),
            1 => self.regs.main.de(),
            2 => self.index_reg(),
            3 => self.regs.sp,
            _ => unreachable!("rp index {p}"),
        }
    }

    fn set_rp(&mut self, p: u8, value: u16) {
        match p {
            0 => self.regs.main.set_bc(value),
            1 => self.regs.main.set_de(value),
            2 => self.set_index_reg(value),
            3 => self.regs.sp = value,
            _ => unreachable!("rp index {p}"),
        }
    }

    /// Register pair from the rp2 table: AF replaces SP.
    fn rp2(&self, p: u8) -> u16 {
        if p == 3 { self.regs.main.af() } else { self.rp(p) }
    }

    fn set_rp2(&mut self, p: u8, value: u16) {
        if p == 3 {
            self.regs.main.set_af(value);
        } else {
            self.set_rp(p, value);
        }
    }

    /// Evaluate condition code cc: NZ, Z, NC, C, PO, PE, P, M.
    fn condition(&self, cc: u8) -> bool {
        let f = self.regs.main.f;
        match cc {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            7 => f & SF != 0,
            _ => unreachable!("condition {cc}"),
        }
    }

    fn carry(&self) -> bool {
        self.regs.main.f & CF != 0
    }

    fn jump_relative(&mut self, d: u8) {
        self.internal(5);
        self.regs.pc = self.regs.pc.wrapping_add_signed(i16::from(d as i8));
    }

    fn call<B: IoBus + ?Sized>(&mut self, bus: &mut B, address: u16) {
        self.internal(1);
        self.push(bus, self.regs.pc);
        self.regs.pc = address;
    }

    fn alu_a(&mut self, op: u8, value: u8) {
        let result = alu::accumulator_op(op, self.regs.main.a, value, self.carry());
        self.regs.main.a = self.commit(result);
    }

    // =========================================================================
    // Unprefixed and DD/FD table
    // =========================================================================

    fn execute_main<B: IoBus + ?Sized>(&mut self, bus: &mut B, op: Opcode) {
        match op.x {
            0 => self.execute_x0(bus, op),
            1 if op.y == 6 && op.z == 6 => self.halt(),
            1 => self.load_register(bus, op.y, op.z),
            2 => {
                let value = self.read_operand(bus, op.z);
                self.alu_a(op.y, value);
            }
            3 => self.execute_x3(bus, op),
            _ => unreachable!("x field {}", op.x),
        }
    }

    fn execute_x0<B: IoBus + ?Sized>(&mut self, bus: &mut B, op: Opcode) {
        match op.z {
            0 => match op.y {
                // NOP
                0 => {}
                // EX AF,AF'
                1 => self.regs.swap_af(),
                // DJNZ d
                2 => {
                    self.internal(1);
                    let d = self.fetch_byte(bus);
                    self.regs.main.b = self.regs.main.b.wrapping_sub(1);
                    if self.regs.main.b != 0 {
                        self.jump_relative(d);
                    }
                }
                // JR d
                3 => {
                    let d = self.fetch_byte(bus);
                    self.jump_relative(d);
                }
                // JR cc,d (NZ, Z, NC, C)
                _ => {
                    let d = self.fetch_byte(bus);
                    if self.condition(op.y - 4) {
                        self.jump_relative(d);
                    }
                }
            },
            1 => {
                if op.q == 0 {
                    // LD rr,nn
                    let nn = self.fetch_word(bus);
                    self.set_rp(op.p, nn);
                } else {
                    // ADD HL,rr
                    let result = alu::add16(self.index_reg(), self.rp(op.p));
                    self.internal(7);
                    self.set_index_reg(result.value);
                    self.set_flags(result.apply(self.regs.main.f));
                }
            }
            2 => match (op.q, op.p) {
                // LD (BC),A / LD (DE),A
                (0, 0) => self.write(bus, self.regs.main.bc(), self.regs.main.a),
                (0, 1) => self.write(bus, self.regs.main.de(), self.regs.main.a),
                // LD (nn),HL
                (0, 2) => {
                    let nn = self.fetch_word(bus);
                    self.write16(bus, nn, self.index_reg());
                }
                // LD (nn),A
                (0, 3) => {
                    let nn = self.fetch_word(bus);
                    self.write(bus, nn, self.regs.main.a);
                }
                // LD A,(BC) / LD A,(DE)
                (1, 0) => self.regs.main.a = self.read(bus, self.regs.main.bc()),
                (1, 1) => self.regs.main.a = self.read(bus, self.regs.main.de()),
                // LD HL,(nn)
                (1, 2) => {
                    let nn = self.fetch_word(bus);
                    let value = self.read16(bus, nn);
                    self.set_index_reg(value);
                }
                // LD A,(nn)
                (1, 3) => {
                    let nn = self.fetch_word(bus);
                    self.regs.main.a = self.read(bus, nn);
                }
                _ => unreachable!("x=0 z=2 q={} p={}", op.q, op.p),
            },
            // INC rr / DEC rr
            3 => {
                self.internal(2);
                let value = self.rp(op.p);
                let value = if op.q == 0 {
                    value.wrapping_add(1)
                } else {
                    value.wrapping_sub(1)
                };
                self.set_rp(op.p, value);
            }
            // INC r
            4 => self.read_modify_write(bus, op.y, |cpu, v| cpu.commit(alu::inc8(v))),
            // DEC r
            5 => self.read_modify_write(bus, op.y, |cpu, v| cpu.commit(alu::dec8(v))),
            // LD r,n
            6 => self.load_immediate(bus, op.y),
            7 => self.accumulator_special(op.y),
            _ => unreachable!("z field {}", op.z),
        }
    }

    fn load_immediate<B: IoBus + ?Sized>(&mut self, bus: &mut B, r: u8) {
        if r != 6 {
            let n = self.fetch_byte(bus);
            self.set_reg8(r, n);
        } else if self.prefix.index().is_some() {
            // LD (IX+d),n: n follows d, overlapping the address calculation
            let d = self.fetch_byte(bus);
            let n = self.fetch_byte(bus);
            self.internal(2);
            self.displacement = Some(d);
            let address = self.operand_address(bus);
            self.write(bus, address, n);
        } else {
            let n = self.fetch_byte(bus);
            self.write(bus, self.regs.main.hl(), n);
        }
    }

    /// RLCA, RRCA, RLA, RRA, DAA, CPL, SCF, CCF.
    fn accumulator_special(&mut self, y: u8) {
        let a = self.regs.main.a;
        let f = self.regs.main.f;
        let result = match y {
            0 => alu::rlca(a),
            1 => alu::rrca(a),
            2 => alu::rla(a, self.carry()),
            3 => alu::rra(a, self.carry()),
            4 => alu::daa(a, f),
            5 => alu::cpl(a),
            6 => alu::scf(a, f, self.last_q),
            7 => alu::ccf(a, f, self.last_q),
            _ => unreachable!("accumulator op {y}"),
        };
        self.regs.main.a = self.commit(result);
    }

    /// LD r,r'. When either side is the memory operand, the other side is
    /// the plain register even under DD/FD.
    fn load_register<B: IoBus + ?Sized>(&mut self, bus: &mut B, y: u8, z: u8) {
        if y == 6 {
            let address = self.operand_address(bus);
            let value = self.plain_reg8(z);
            self.write(bus, address, value);
        } else if z == 6 {
            let address = self.operand_address(bus);
            let value = self.read(bus, address);
            self.set_plain_reg8(y, value);
        } else {
            let value = self.reg8(z);
            self.set_reg8(y, value);
        }
    }

    fn halt(&mut self) {
        if !self.is_halted() {
            debug!(pc = self.regs.pc.wrapping_sub(1), "HALT");
        }
        self.outputs.remove(OutputSignals::HALT);
        // Refetch HALT until an interrupt moves PC past it
        self.regs.pc = self.regs.pc.wrapping_sub(1);
    }

    fn execute_x3<B: IoBus + ?Sized>(&mut self, bus: &mut B, op: Opcode) {
        match op.z {
            // RET cc
            0 => {
                self.internal(1);
                if self.condition(op.y) {
                    self.regs.pc = self.pop(bus);
                }
            }
            1 => match (op.q, op.p) {
                // POP rr
                (0, p) => {
                    let value = self.pop(bus);
                    self.set_rp2(p, value);
                }
                // RET
                (1, 0) => self.regs.pc = self.pop(bus),
                // EXX
                (1, 1) => self.regs.swap_general(),
                // JP (HL)
                (1, 2) => self.regs.pc = self.index_reg(),
                // LD SP,HL
                (1, 3) => {
                    self.internal(2);
                    self.regs.sp = self.index_reg();
                }
                _ => unreachable!("x=3 z=1 q={} p={}", op.q, op.p),
            },
            // JP cc,nn
            2 => {
                let nn = self.fetch_word(bus);
                if self.condition(op.y) {
                    self.regs.pc = nn;
                }
            }
            3 => match op.y {
                // JP nn
                0 => self.regs.pc = self.fetch_word(bus),
                // OUT (n),A
                2 => {
                    let n = self.fetch_byte(bus);
                    let a = self.regs.main.a;
                    self.port_out(bus, u16::from_be_bytes([a, n]), a);
                }
                // IN A,(n)
                3 => {
                    let n = self.fetch_byte(bus);
                    let port = u16::from_be_bytes([self.regs.main.a, n]);
                    self.regs.main.a = self.port_in(bus, port);
                }
                // EX (SP),HL
                4 => {
                    let sp = self.regs.sp;
                    let value = self.read16(bus, sp);
                    self.internal(1);
                    let [lo, hi] = self.index_reg().to_le_bytes();
                    self.write(bus, sp.wrapping_add(1), hi);
                    self.write(bus, sp, lo);
                    self.internal(2);
                    self.set_index_reg(value);
                }
                // EX DE,HL (never substituted)
                5 => {
                    let de = self.regs.main.de();
                    self.regs.main.set_de(self.regs.main.hl());
                    self.regs.main.set_hl(de);
                }
                // DI
                6 => {
                    self.regs.iff1 = false;
                    self.regs.iff2 = false;
                    self.suppress_interrupts = true;
                }
                // EI
                7 => {
                    self.regs.iff1 = true;
                    self.regs.iff2 = true;
                    self.suppress_interrupts = true;
                }
                _ => unreachable!("prefix byte {:#04X} reached the main table", 0xC3 | (op.y << 3)),
            },
            // CALL cc,nn
            4 => {
                let nn = self.fetch_word(bus);
                if self.condition(op.y) {
                    self.call(bus, nn);
                }
            }
            5 => match (op.q, op.p) {
                // PUSH rr
                (0, p) => {
                    self.internal(1);
                    self.push(bus, self.rp2(p));
                }
                // CALL nn
                (1, 0) => {
                    let nn = self.fetch_word(bus);
                    self.call(bus, nn);
                }
                _ => unreachable!("prefix byte {:#04X} reached the main table", 0xCD | (op.p << 4)),
            },
            // ALU A,n
            6 => {
                let n = self.fetch_byte(bus);
                self.alu_a(op.y, n);
            }
            // RST p
            7 => self.call(bus, u16::from(op.y) * 8),
            _ => unreachable!("z field {}", op.z),
        }
    }

    // =========================================================================
    // CB table
    // =========================================================================

    fn execute_cb<B: IoBus + ?Sized>(&mut self, bus: &mut B, op: Opcode) {
        let y = op.y;
        match op.x {
            // Rotates and shifts
            0 => self.read_modify_write(bus, op.z, |cpu, v| {
                let carry = cpu.carry();
                cpu.commit(alu::rotate_shift(y, v, carry))
            }),
            // BIT y,r
            1 => {
                let result = if op.z == 6 {
                    let address = self.regs.main.hl();
                    let value = self.read(bus, address);
                    self.internal(1);
                    alu::bit(y, value, (address >> 8) as u8)
                } else {
                    let value = self.reg8(op.z);
                    alu::bit(y, value, value)
                };
                self.commit(result);
            }
            // RES y,r
            2 => self.read_modify_write(bus, op.z, |_, v| v & !(1 << y)),
            // SET y,r
            3 => self.read_modify_write(bus, op.z, |_, v| v | (1 << y)),
            _ => unreachable!("x field {}", op.x),
        }
    }

    /// DD CB d op / FD CB d op. Every form operates on (IX+d); forms with
    /// z != 6 also copy the result to register z.
    fn execute_indexed_cb<B: IoBus + ?Sized>(&mut self, bus: &mut B, op: Opcode) {
        let address = self.operand_address(bus);
        let value = self.read(bus, address);
        self.internal(1);

        let result = match op.x {
            0 => {
                let carry = self.carry();
                self.commit(alu::rotate_shift(op.y, value, carry))
            }
            1 => {
                self.commit(alu::bit(op.y, value, (address >> 8) as u8));
                return;
            }
            2 => value & !(1 << op.y),
            3 => value | (1 << op.y),
            _ => unreachable!("x field {}", op.x),
        };

        self.write(bus, address, result);
        if op.z != 6 {
            self.set_plain_reg8(op.z, result);
        }
    }

    // =========================================================================
    // ED table
    // =========================================================================

    fn execute_ed<B: IoBus + ?Sized>(&mut self, bus: &mut B, op: Opcode) {
        match op.x {
            1 => self.execute_ed_x1(bus, op),
            2 if op.y >= 4 && op.z <= 3 => self.execute_block(bus, op),
            // Undefined: behaves as two NOPs that hold off interrupts
            _ => self.suppress_interrupts = true,
        }
    }

    fn execute_ed_x1<B: IoBus + ?Sized>(&mut self, bus: &mut B, op: Opcode) {
        match op.z {
            // IN r,(C) / IN (C)
            0 => {
                let value = self.port_in(bus, self.regs.main.bc());
                self.set_flags(sz53p(value) | (self.regs.main.f & CF));
                if op.y != 6 {
                    self.set_plain_reg8(op.y, value);
                }
            }
            // OUT (C),r / OUT (C),0
            1 => {
                let value = if op.y == 6 { 0 } else { self.plain_reg8(op.y) };
                self.port_out(bus, self.regs.main.bc(), value);
            }
            // SBC HL,rr / ADC HL,rr
            2 => {
                let hl = self.regs.main.hl();
                let operand = self.rp(op.p);
                let result = if op.q == 0 {
                    alu::sbc16(hl, operand, self.carry())
                } else {
                    alu::adc16(hl, operand, self.carry())
                };
                self.internal(7);
                self.regs.main.set_hl(result.value);
                self.set_flags(result.apply(self.regs.main.f));
            }
            // LD (nn),rr / LD rr,(nn)
            3 => {
                let nn = self.fetch_word(bus);
                if op.q == 0 {
                    self.write16(bus, nn, self.rp(op.p));
                } else {
                    let value = self.read16(bus, nn);
                    self.set_rp(op.p, value);
                }
            }
            // NEG
            4 => {
                let result = alu::neg8(self.regs.main.a);
                self.regs.main.a = self.commit(result);
            }
            // RETN / RETI
            5 => {
                self.regs.iff1 = self.regs.iff2;
                self.regs.pc = self.pop(bus);
                self.in_block_loop = self.in_block_loop_prev;
                if op.y == 1 {
                    bus.on_reti();
                }
            }
            // IM 0/0/1/2
            6 => {
                self.regs.im = match op.y & 3 {
                    0 | 1 => InterruptMode::Im0,
                    2 => InterruptMode::Im1,
                    _ => InterruptMode::Im2,
                };
            }
            7 => match op.y {
                // LD I,A
                0 => {
                    self.internal(1);
                    self.regs.i = self.regs.main.a;
                }
                // LD R,A
                1 => {
                    self.internal(1);
                    self.regs.r = self.regs.main.a;
                }
                // LD A,I / LD A,R
                2 | 3 => {
                    self.internal(1);
                    let value = if op.y == 2 { self.regs.i } else { self.regs.r };
                    self.regs.main.a = value;
                    let mut f = sz53(value) | (self.regs.main.f & CF);
                    if self.regs.iff2 && !self.pending_int {
                        f |= PF;
                    }
                    self.set_flags(f);
                }
                // RRD / RLD
                4 | 5 => self.rotate_digit(bus, op.y == 5),
                // ED 77 / ED 7F
                _ => {}
            },
            _ => unreachable!("z field {}", op.z),
        }
    }

    /// RRD and RLD: rotate a BCD digit between A and (HL).
    fn rotate_digit<B: IoBus + ?Sized>(&mut self, bus: &mut B, left: bool) {
        let address = self.regs.main.hl();
        let m = self.read(bus, address);
        self.internal(4);

        let a = self.regs.main.a;
        let (memory, digit) = if left {
            ((m << 4) | (a & 0x0F), m >> 4)
        } else {
            ((a << 4) | (m >> 4), m & 0x0F)
        };
        let a = (a & 0xF0) | digit;
        self.regs.main.a = a;
        self.write(bus, address, memory);

        self.set_flags(sz53p(a) | (self.regs.main.f & CF));
    }
}
