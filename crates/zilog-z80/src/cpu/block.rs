//! Block transfer, compare and I/O instructions.
//!
//! LDI/LDD/CPI/CPD/INI/IND/OUTI/OUTD perform one iteration. The repeating
//! forms run the same iteration and, while the repeat condition holds, rewind
//! PC onto the instruction and spend 5 more cycles. The host sees the loop
//! through [`Z80::in_block_loop`] and may take interrupts between iterations.

use emu_core::IoBus;

use super::Z80;
use crate::alu;
use crate::decode::Opcode;
use crate::flags::ZF;

impl Z80 {
    /// ED A0-BB: y selects I/D/IR/DR (4-7), z selects LD/CP/IN/OUT.
    pub(super) fn execute_block<B: IoBus + ?Sized>(&mut self, bus: &mut B, op: Opcode) {
        let decrement = op.y & 1 != 0;
        let repeat = op.y >= 6;

        let again = match op.z {
            0 => self.block_transfer(bus, decrement),
            1 => self.block_compare(bus, decrement),
            2 => self.block_input(bus, decrement),
            3 => self.block_output(bus, decrement),
            _ => unreachable!("block op z={}", op.z),
        };

        if repeat && again {
            self.internal(5);
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.in_block_loop = true;
        }
    }

    fn step_hl(&mut self, decrement: bool) {
        let hl = self.regs.main.hl();
        self.regs.main.set_hl(if decrement {
            hl.wrapping_sub(1)
        } else {
            hl.wrapping_add(1)
        });
    }

    fn decrement_bc(&mut self) -> u16 {
        let bc = self.regs.main.bc().wrapping_sub(1);
        self.regs.main.set_bc(bc);
        bc
    }

    /// LDI/LDD: (DE) <- (HL). Repeats while BC != 0.
    fn block_transfer<B: IoBus + ?Sized>(&mut self, bus: &mut B, decrement: bool) -> bool {
        let value = self.read(bus, self.regs.main.hl());
        self.write(bus, self.regs.main.de(), value);
        self.internal(2);

        let de = self.regs.main.de();
        self.regs.main.set_de(if decrement {
            de.wrapping_sub(1)
        } else {
            de.wrapping_add(1)
        });
        self.step_hl(decrement);
        let bc = self.decrement_bc();

        let result = alu::block_transfer_flags(value, self.regs.main.a, bc);
        self.commit(result);
        bc != 0
    }

    /// CPI/CPD: compare A with (HL). Repeats while BC != 0 and no match.
    fn block_compare<B: IoBus + ?Sized>(&mut self, bus: &mut B, decrement: bool) -> bool {
        let value = self.read(bus, self.regs.main.hl());
        self.internal(5);

        self.step_hl(decrement);
        let bc = self.decrement_bc();

        let result = alu::block_compare_flags(self.regs.main.a, value, bc);
        self.commit(result);
        bc != 0 && self.regs.main.f & ZF == 0
    }

    /// INI/IND: (HL) <- port BC, then B decrements. Repeats while B != 0.
    fn block_input<B: IoBus + ?Sized>(&mut self, bus: &mut B, decrement: bool) -> bool {
        self.internal(1);
        let value = self.port_in(bus, self.regs.main.bc());
        self.write(bus, self.regs.main.hl(), value);

        let b = self.regs.main.b.wrapping_sub(1);
        self.regs.main.b = b;
        self.step_hl(decrement);

        let c = self.regs.main.c;
        let addend = if decrement {
            c.wrapping_sub(1)
        } else {
            c.wrapping_add(1)
        };
        self.commit(alu::block_io_flags(value, addend, b));
        b != 0
    }

    /// OUTI/OUTD: B decrements, then port BC <- (HL). Repeats while B != 0.
    fn block_output<B: IoBus + ?Sized>(&mut self, bus: &mut B, decrement: bool) -> bool {
        self.internal(1);
        let value = self.read(bus, self.regs.main.hl());

        let b = self.regs.main.b.wrapping_sub(1);
        self.regs.main.b = b;
        self.port_out(bus, self.regs.main.bc(), value);
        self.step_hl(decrement);

        self.commit(alu::block_io_flags(value, self.regs.main.l, b));
        b != 0
    }
}
