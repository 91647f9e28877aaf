//! Z80 CPU core driven one fetched byte per step.

mod block;
mod execute;
mod interrupt;

use std::fmt;

use emu_core::{Clock, IoBus, Observable, Ticks, Value};
use tracing::trace;

use crate::alu::AluResult;
use crate::error::Z80Error;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::prefix::Prefix;
use crate::registers::{
    InterruptMode, Register8, RegisterMask, RegisterPair, RegisterSet, Registers,
};
use crate::signals::{InputSignals, OutputSignals};

/// Z80 CPU.
///
/// The CPU does not own the bus. It is passed to [`Z80::step`] on every call
/// so the host can share it with other hardware between steps.
#[derive(Debug, Clone)]
pub struct Z80 {
    // === Registers ===
    pub(crate) regs: Registers,

    // === Decode state ===
    /// Table the next fetched byte is decoded in.
    prefix: Prefix,
    /// Displacement already fetched for the current indexed instruction.
    displacement: Option<u8>,
    /// Flags written by the current instruction (0 if none).
    q: u8,
    /// Flags written by the previous instruction.
    last_q: u8,
    /// Last byte fetched in an opcode slot, DD CB trailing bytes included.
    last_opcode: u8,
    /// Last byte fetched from the instruction stream.
    last_byte: u8,

    // === Signals ===
    outputs: OutputSignals,
    prev_inputs: InputSignals,

    // === Interrupt state ===
    /// Set by EI, DI and undefined ED opcodes; blocks acceptance for one step.
    suppress_interrupts: bool,
    pending_nmi: bool,
    pending_int: bool,
    /// A repeating block instruction rewound PC on this step.
    in_block_loop: bool,
    /// Block loop flag at the time the last interrupt was accepted.
    in_block_loop_prev: bool,
    reset_phase: u8,

    // === Timing ===
    clock: Clock,
}

impl Z80 {
    /// Create a Z80 that has just completed its power-on reset.
    #[must_use]
    pub fn new() -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            prefix: Prefix::None,
            displacement: None,
            q: 0,
            last_q: 0,
            last_opcode: 0,
            last_byte: 0,
            outputs: OutputSignals::INACTIVE,
            prev_inputs: InputSignals::INACTIVE,
            suppress_interrupts: false,
            pending_nmi: false,
            pending_int: false,
            in_block_loop: false,
            in_block_loop_prev: false,
            reset_phase: 0,
            clock: Clock::new(),
        };
        for _ in 0..3 {
            cpu.run_reset_phase();
        }
        cpu
    }

    /// Advance the CPU by one unit of work.
    ///
    /// Each call runs one reset phase, charges one wait cycle, accepts one
    /// interrupt, or fetches and executes one opcode byte. Returns true while
    /// a prefixed instruction is still being decoded and the host must call
    /// again to finish it.
    pub fn step<B: IoBus + ?Sized>(&mut self, bus: &mut B, signals: InputSignals) -> bool {
        if signals.is_asserted(InputSignals::RESET) {
            self.prev_inputs = signals;
            self.run_reset_phase();
            return false;
        }
        self.reset_phase = 0;

        if signals.is_asserted(InputSignals::WAIT) {
            self.clock.advance(1);
            return self.prefix != Prefix::None;
        }

        let previous = std::mem::replace(&mut self.prev_inputs, signals);
        let masked = self.suppress_interrupts || self.prefix != Prefix::None;

        if self.pending_nmi || signals.fell(previous, InputSignals::NMI) {
            if !masked {
                self.accept_nmi(bus);
                return false;
            }
            if !self.pending_nmi {
                trace!(prefix = ?self.prefix, "NMI latched");
            }
            self.pending_nmi = true;
        }

        if self.pending_int || signals.fell(previous, InputSignals::INT) {
            if masked {
                if self.regs.iff1 && !self.pending_int {
                    trace!(prefix = ?self.prefix, "INT latched");
                }
                self.pending_int = self.regs.iff1;
            } else if self.regs.iff1 {
                return self.accept_int(bus);
            } else {
                if self.pending_int {
                    trace!("latched INT dropped, IFF1 clear");
                }
                self.pending_int = false;
            }
        }

        if self.prefix == Prefix::None {
            self.last_q = self.q;
            self.q = 0;
        }
        let byte = self.fetch_opcode(bus);
        let completed = self.execute(bus, byte);
        if completed {
            self.prefix = Prefix::None;
            self.displacement = None;
        }
        !completed
    }

    /// Step until the current instruction completes.
    ///
    /// `signals` is applied to the first step; the remaining steps see every
    /// line high. Returns the cycles spent.
    pub fn run_instruction<B: IoBus + ?Sized>(
        &mut self,
        bus: &mut B,
        signals: InputSignals,
    ) -> Ticks {
        let start = self.clock.read();
        let mut pending = self.step(bus, signals);
        while pending {
            pending = self.step(bus, InputSignals::INACTIVE);
        }
        self.clock.read() - start
    }

    /// Like [`Z80::run_instruction`], but also runs a repeating block
    /// instruction until it stops looping.
    pub fn run_instruction_with_block<B: IoBus + ?Sized>(
        &mut self,
        bus: &mut B,
        signals: InputSignals,
    ) -> Ticks {
        let start = self.clock.read();
        let mut pending = self.step(bus, signals);
        while pending || self.in_block_loop {
            pending = self.step(bus, InputSignals::INACTIVE);
        }
        self.clock.read() - start
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Bus access and timing
// =========================================================================

impl Z80 {
    fn internal(&mut self, cycles: u32) {
        self.clock.advance(cycles);
    }

    /// Fetch the next instruction byte as an M1 cycle.
    ///
    /// The displacement and opcode bytes of DD CB / FD CB are not M1 reads
    /// and leave R alone, but still count as the last opcode byte.
    fn fetch_opcode<B: IoBus + ?Sized>(&mut self, bus: &mut B) -> u8 {
        let m1 = !self.prefix.is_indexed_bit_op();
        let byte = bus.read(self.regs.pc, m1);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.clock.advance(4);
        self.outputs.set(OutputSignals::M1, !m1);
        if m1 {
            self.regs.bump_refresh();
        }
        self.last_opcode = byte;
        self.last_byte = byte;
        byte
    }

    /// Fetch an immediate operand byte.
    fn fetch_byte<B: IoBus + ?Sized>(&mut self, bus: &mut B) -> u8 {
        let byte = self.read(bus, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.last_byte = byte;
        byte
    }

    fn fetch_word<B: IoBus + ?Sized>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        u16::from_le_bytes([lo, hi])
    }

    fn read<B: IoBus + ?Sized>(&mut self, bus: &mut B, address: u16) -> u8 {
        self.clock.advance(3);
        bus.read(address, false)
    }

    fn write<B: IoBus + ?Sized>(&mut self, bus: &mut B, address: u16, value: u8) {
        self.clock.advance(3);
        bus.write(address, value);
    }

    fn read16<B: IoBus + ?Sized>(&mut self, bus: &mut B, address: u16) -> u16 {
        let lo = self.read(bus, address);
        let hi = self.read(bus, address.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    fn write16<B: IoBus + ?Sized>(&mut self, bus: &mut B, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write(bus, address, lo);
        self.write(bus, address.wrapping_add(1), hi);
    }

    fn port_in<B: IoBus + ?Sized>(&mut self, bus: &mut B, port: u16) -> u8 {
        self.clock.advance(4);
        bus.read_io(port)
    }

    fn port_out<B: IoBus + ?Sized>(&mut self, bus: &mut B, port: u16, value: u8) {
        self.clock.advance(4);
        bus.write_io(port, value);
    }

    /// Push high byte first.
    fn push<B: IoBus + ?Sized>(&mut self, bus: &mut B, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write(bus, self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write(bus, self.regs.sp, lo);
    }

    fn pop<B: IoBus + ?Sized>(&mut self, bus: &mut B) -> u16 {
        let value = self.read16(bus, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    /// Write F and record it in Q.
    fn set_flags(&mut self, f: u8) {
        self.regs.main.f = f;
        self.q = f;
    }

    /// Apply an ALU result's flags and return its value.
    fn commit(&mut self, result: AluResult) -> u8 {
        self.set_flags(result.apply(self.regs.main.f));
        result.value
    }
}

// =========================================================================
// Host accessors (no clock charge)
// =========================================================================

impl Z80 {
    #[must_use]
    pub const fn reg(&self, reg: Register8, set: RegisterSet) -> u8 {
        self.regs.bank(set).get(reg)
    }

    pub fn set_reg(&mut self, reg: Register8, set: RegisterSet, value: u8) {
        self.regs.bank_mut(set).set(reg, value);
    }

    #[must_use]
    pub const fn pair(&self, pair: RegisterPair, set: RegisterSet) -> u16 {
        self.regs.bank(set).pair(pair)
    }

    pub fn set_pair(&mut self, pair: RegisterPair, set: RegisterSet, value: u16) {
        self.regs.bank_mut(set).set_pair(pair, value);
    }

    #[must_use]
    pub const fn a(&self) -> u8 {
        self.regs.main.a
    }

    pub fn set_a(&mut self, value: u8) {
        self.regs.main.a = value;
    }

    #[must_use]
    pub const fn f(&self) -> u8 {
        self.regs.main.f
    }

    pub fn set_f(&mut self, value: u8) {
        self.regs.main.f = value;
    }

    #[must_use]
    pub const fn af(&self) -> u16 {
        self.regs.main.af()
    }

    pub fn set_af(&mut self, value: u16) {
        self.regs.main.set_af(value);
    }

    #[must_use]
    pub const fn bc(&self) -> u16 {
        self.regs.main.bc()
    }

    pub fn set_bc(&mut self, value: u16) {
        self.regs.main.set_bc(value);
    }

    #[must_use]
    pub const fn de(&self) -> u16 {
        self.regs.main.de()
    }

    pub fn set_de(&mut self, value: u16) {
        self.regs.main.set_de(value);
    }

    #[must_use]
    pub const fn hl(&self) -> u16 {
        self.regs.main.hl()
    }

    pub fn set_hl(&mut self, value: u16) {
        self.regs.main.set_hl(value);
    }

    #[must_use]
    pub const fn ix(&self) -> u16 {
        self.regs.ix
    }

    pub fn set_ix(&mut self, value: u16) {
        self.regs.ix = value;
    }

    #[must_use]
    pub const fn iy(&self) -> u16 {
        self.regs.iy
    }

    pub fn set_iy(&mut self, value: u16) {
        self.regs.iy = value;
    }

    #[must_use]
    pub const fn sp(&self) -> u16 {
        self.regs.sp
    }

    pub fn set_sp(&mut self, value: u16) {
        self.regs.sp = value;
    }

    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.regs.pc
    }

    pub fn set_pc(&mut self, value: u16) {
        self.regs.pc = value;
    }

    #[must_use]
    pub const fn i(&self) -> u8 {
        self.regs.i
    }

    pub fn set_i(&mut self, value: u8) {
        self.regs.i = value;
    }

    #[must_use]
    pub const fn r(&self) -> u8 {
        self.regs.r
    }

    pub fn set_r(&mut self, value: u8) {
        self.regs.r = value;
    }

    #[must_use]
    pub const fn iff1(&self) -> bool {
        self.regs.iff1
    }

    #[must_use]
    pub const fn iff2(&self) -> bool {
        self.regs.iff2
    }

    pub fn set_iff(&mut self, iff1: bool, iff2: bool) {
        self.regs.iff1 = iff1;
        self.regs.iff2 = iff2;
    }

    #[must_use]
    pub const fn im(&self) -> InterruptMode {
        self.regs.im
    }

    pub fn set_im(&mut self, mode: InterruptMode) {
        self.regs.im = mode;
    }

    /// Set the interrupt mode from its number, as stored in snapshot files.
    pub fn set_im_raw(&mut self, mode: u8) -> Result<(), Z80Error> {
        self.regs.im = InterruptMode::try_from(mode)?;
        Ok(())
    }

    /// The whole register file.
    #[must_use]
    pub const fn registers(&self) -> &Registers {
        &self.regs
    }

    /// Cycles elapsed since construction, reset phases included.
    #[must_use]
    pub const fn clock(&self) -> Ticks {
        self.clock.read()
    }

    #[must_use]
    pub const fn outputs(&self) -> OutputSignals {
        self.outputs
    }

    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.outputs.is_asserted(OutputSignals::HALT)
    }

    #[must_use]
    pub const fn prefix(&self) -> Prefix {
        self.prefix
    }

    #[must_use]
    pub const fn in_block_loop(&self) -> bool {
        self.in_block_loop
    }

    #[must_use]
    pub const fn pending_nmi(&self) -> bool {
        self.pending_nmi
    }

    #[must_use]
    pub const fn pending_int(&self) -> bool {
        self.pending_int
    }

    #[must_use]
    pub const fn last_opcode(&self) -> u8 {
        self.last_opcode
    }

    #[must_use]
    pub const fn last_byte(&self) -> u8 {
        self.last_byte
    }

    #[must_use]
    pub const fn prev_inputs(&self) -> InputSignals {
        self.prev_inputs
    }

    /// Overwrite this CPU's state with a copy of `other`.
    pub fn fill_from(&mut self, other: &Self) {
        self.clone_from(other);
    }

    /// Bring this CPU in line with `other` for the registers in `mask`.
    ///
    /// The decoder state, interrupt latches, I, R, the flip-flops and the
    /// interrupt mode are always copied. Clock, output lines and Q stay.
    pub fn align_from(&mut self, other: &Self, mask: RegisterMask) {
        self.prefix = other.prefix;
        self.displacement = other.displacement;
        self.regs.iff1 = other.regs.iff1;
        self.regs.iff2 = other.regs.iff2;
        self.regs.im = other.regs.im;
        self.regs.i = other.regs.i;
        self.regs.r = other.regs.r;
        self.in_block_loop = other.in_block_loop;
        self.in_block_loop_prev = other.in_block_loop_prev;
        self.prev_inputs = other.prev_inputs;
        self.suppress_interrupts = other.suppress_interrupts;
        self.pending_int = other.pending_int;
        self.pending_nmi = other.pending_nmi;

        self.regs.align_with(&other.regs, mask);
    }

    /// Direct access to the register file.
    ///
    /// Only available in test builds.
    #[cfg(feature = "test-utils")]
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Put the decoder mid-instruction.
    ///
    /// Only available in test builds.
    #[cfg(feature = "test-utils")]
    pub fn force_prefix(&mut self, prefix: Prefix, displacement: Option<u8>) {
        self.prefix = prefix;
        self.displacement = displacement;
    }

    /// Assert /HALT as if the HALT opcode at PC had just executed. PC is not
    /// moved, so it should already point at a HALT byte.
    ///
    /// Only available in test builds.
    #[cfg(feature = "test-utils")]
    pub fn force_halt(&mut self) {
        self.outputs.remove(OutputSignals::HALT);
    }
}

impl fmt::Display for Z80 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.regs;
        write!(
            f,
            "PC={:04X} SP={:04X} AF={:04X} BC={:04X} DE={:04X} HL={:04X} \
             AF'={:04X} BC'={:04X} DE'={:04X} HL'={:04X} IX={:04X} IY={:04X} \
             I={:02X} R={:02X} IFF={}{} {} T={}",
            r.pc,
            r.sp,
            r.main.af(),
            r.main.bc(),
            r.main.de(),
            r.main.hl(),
            r.shadow.af(),
            r.shadow.bc(),
            r.shadow.de(),
            r.shadow.hl(),
            r.ix,
            r.iy,
            r.i,
            r.r,
            u8::from(r.iff1),
            u8::from(r.iff2),
            r.im,
            self.clock.read(),
        )
    }
}

/// All query paths supported by the Z80.
const Z80_QUERY_PATHS: &[&str] = &[
    // Main registers
    "a", "f", "b", "c", "d", "e", "h", "l",
    // Register pairs
    "af", "bc", "de", "hl",
    // Alternate pairs
    "af'", "bc'", "de'", "hl'",
    // Index registers
    "ix", "iy", "ixh", "ixl", "iyh", "iyl",
    // Other registers
    "sp", "pc", "i", "r",
    // Flags (individual)
    "flags.s", "flags.z", "flags.y", "flags.h",
    "flags.x", "flags.p", "flags.n", "flags.c",
    // Interrupt state
    "iff1", "iff2", "im", "pending_nmi", "pending_int",
    // Signals
    "m1", "halted",
    // Decode state
    "prefix", "opcode", "in_block_loop", "ticks",
];

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        let main = &self.regs.main;
        let shadow = &self.regs.shadow;
        let flag = |bit: u8| Some(Value::from(main.f & bit != 0));

        match path {
            "a" => Some(main.a.into()),
            "f" => Some(main.f.into()),
            "b" => Some(main.b.into()),
            "c" => Some(main.c.into()),
            "d" => Some(main.d.into()),
            "e" => Some(main.e.into()),
            "h" => Some(main.h.into()),
            "l" => Some(main.l.into()),

            "af" => Some(main.af().into()),
            "bc" => Some(main.bc().into()),
            "de" => Some(main.de().into()),
            "hl" => Some(main.hl().into()),

            "af'" => Some(shadow.af().into()),
            "bc'" => Some(shadow.bc().into()),
            "de'" => Some(shadow.de().into()),
            "hl'" => Some(shadow.hl().into()),

            "ix" => Some(self.regs.ix.into()),
            "iy" => Some(self.regs.iy.into()),
            "ixh" => Some(((self.regs.ix >> 8) as u8).into()),
            "ixl" => Some((self.regs.ix as u8).into()),
            "iyh" => Some(((self.regs.iy >> 8) as u8).into()),
            "iyl" => Some((self.regs.iy as u8).into()),

            "sp" => Some(self.regs.sp.into()),
            "pc" => Some(self.regs.pc.into()),
            "i" => Some(self.regs.i.into()),
            "r" => Some(self.regs.r.into()),

            "flags.s" => flag(SF),
            "flags.z" => flag(ZF),
            "flags.y" => flag(YF),
            "flags.h" => flag(HF),
            "flags.x" => flag(XF),
            "flags.p" => flag(PF),
            "flags.n" => flag(NF),
            "flags.c" => flag(CF),

            "iff1" => Some(self.regs.iff1.into()),
            "iff2" => Some(self.regs.iff2.into()),
            "im" => Some(self.regs.im.as_u8().into()),
            "pending_nmi" => Some(self.pending_nmi.into()),
            "pending_int" => Some(self.pending_int.into()),

            "m1" => Some(self.outputs.is_asserted(OutputSignals::M1).into()),
            "halted" => Some(self.is_halted().into()),

            "prefix" => Some(Value::String(format!("{:?}", self.prefix))),
            "opcode" => Some(self.last_opcode.into()),
            "in_block_loop" => Some(self.in_block_loop.into()),
            "ticks" => Some(self.clock.read().get().into()),

            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        Z80_QUERY_PATHS
    }
}
