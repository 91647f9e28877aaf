//! Reset sequencing and interrupt acceptance.

use emu_core::IoBus;
use tracing::debug;

use super::Z80;
use crate::prefix::Prefix;
use crate::registers::InterruptMode;
use crate::signals::OutputSignals;

/// Non-maskable interrupt vector.
const NMI_VECTOR: u16 = 0x0066;

/// Opcode executed on mode 1 acceptance (RST 38h).
const RST_38: u8 = 0xFF;

impl Z80 {
    /// Run one phase of the reset sequence. Each phase costs 3 cycles.
    pub(super) fn run_reset_phase(&mut self) {
        let phase = self.reset_phase;
        match phase {
            0 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
                self.regs.i = 0;
                self.regs.r = 0;
                self.regs.im = InterruptMode::Im0;
                self.q = 0;
                self.last_q = 0;
            }
            1 => {
                self.regs.pc = 0;
                self.regs.sp = 0xFFFF;
            }
            2 => {
                self.regs.main.set_af(0xFFFF);
                self.regs.shadow.set_af(0xFFFF);
            }
            _ => unreachable!("reset phase {phase} out of range"),
        }

        self.prefix = Prefix::None;
        self.displacement = None;
        self.suppress_interrupts = false;
        self.pending_nmi = false;
        self.pending_int = false;
        self.in_block_loop = false;
        self.in_block_loop_prev = false;
        self.outputs = OutputSignals::INACTIVE;

        self.clock.advance(3);
        self.reset_phase = (phase + 1) % 3;
        debug!(phase, clock = %self.clock.read(), "reset phase");
    }

    /// Work shared by every acceptance: leave HALT, park the block loop flag
    /// and acknowledge.
    fn begin_acceptance<B: IoBus + ?Sized>(&mut self, bus: &mut B, nmi: bool) {
        if self.is_halted() {
            self.outputs.insert(OutputSignals::HALT);
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        self.outputs.remove(OutputSignals::M1);
        self.in_block_loop_prev = self.in_block_loop;
        self.in_block_loop = false;
        self.q = 0;
        self.regs.bump_refresh();
        bus.on_interrupt(nmi);
    }

    /// Accept a non-maskable interrupt: 11 cycles, IFF2 keeps the old IFF1.
    pub(super) fn accept_nmi<B: IoBus + ?Sized>(&mut self, bus: &mut B) {
        self.begin_acceptance(bus, true);
        self.regs.iff1 = false;
        self.pending_nmi = false;
        self.pending_int = false;

        self.internal(5);
        self.push(bus, self.regs.pc);
        debug!(return_to = self.regs.pc, "NMI accepted");
        self.regs.pc = NMI_VECTOR;
    }

    /// Accept a maskable interrupt and dispatch it by mode.
    ///
    /// Returns true if a mode 0 device supplied a prefix byte, in which case
    /// the instruction continues on the next step.
    pub(super) fn accept_int<B: IoBus + ?Sized>(&mut self, bus: &mut B) -> bool {
        self.begin_acceptance(bus, false);
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.pending_int = false;

        let return_to = self.regs.pc;
        self.internal(6);

        match self.regs.im {
            InterruptMode::Im0 => {
                let opcode = bus.interrupt_vector();
                debug!(mode = 0, opcode, return_to, "INT accepted");
                let completed = self.execute(bus, opcode);
                return !completed;
            }
            InterruptMode::Im1 => {
                debug!(mode = 1, return_to, "INT accepted");
                self.execute(bus, RST_38);
            }
            InterruptMode::Im2 => {
                let vector = bus.interrupt_vector();
                let pointer = (u16::from(self.regs.i) << 8) | u16::from(vector);
                self.internal(1);
                self.push(bus, self.regs.pc);
                self.regs.pc = self.read16(bus, pointer);
                debug!(mode = 2, pointer, handler = self.regs.pc, return_to, "INT accepted");
            }
        }
        false
    }
}
