//! Cycle-accurate Z80 CPU interpreter.
//!
//! The core is driven one fetched byte at a time through [`Z80::step`].
//! Multi-byte prefixes and block instruction loops span several steps, so a
//! host can interleave other hardware or sample interrupts between them.
//! [`Z80::run_instruction`] and [`Z80::run_instruction_with_block`] step to
//! the next instruction boundary.
//!
//! Memory and I/O go through an [`IoBus`] supplied by the host on every call.

pub mod alu;
mod cpu;
mod decode;
mod error;
mod flags;
mod prefix;
mod registers;
mod signals;

pub use cpu::Z80;
pub use decode::Opcode;
pub use emu_core::{Bus, IoBus, Observable, Ticks, Value};
pub use error::Z80Error;
pub use flags::{CF, HF, NF, PARITY, PF, SF, XF, YF, ZF, parity, sz53, sz53p};
pub use prefix::{Index, Prefix};
pub use registers::{
    InterruptMode, Register8, RegisterBank, RegisterMask, RegisterPair, RegisterSet, Registers,
};
pub use signals::{InputSignals, OutputSignals};
