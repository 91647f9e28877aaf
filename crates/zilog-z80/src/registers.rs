//! Z80 register file.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::Z80Error;
use crate::flags::CF;

/// One of the eight 8-bit slots of a register bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register8 {
    A,
    F,
    B,
    C,
    D,
    E,
    H,
    L,
}

/// A register pair formed from two adjacent slots (high byte first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterPair {
    AF,
    BC,
    DE,
    HL,
}

/// Which of the two banks an accessor addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegisterSet {
    #[default]
    Main,
    /// The alternate bank swapped in by EX AF,AF' and EXX.
    Shadow,
}

impl FromStr for Register8 {
    type Err = Z80Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "a" => Ok(Self::A),
            "f" => Ok(Self::F),
            "b" => Ok(Self::B),
            "c" => Ok(Self::C),
            "d" => Ok(Self::D),
            "e" => Ok(Self::E),
            "h" => Ok(Self::H),
            "l" => Ok(Self::L),
            _ => Err(Z80Error::UnknownRegister(name.to_string())),
        }
    }
}

impl FromStr for RegisterPair {
    type Err = Z80Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "af" => Ok(Self::AF),
            "bc" => Ok(Self::BC),
            "de" => Ok(Self::DE),
            "hl" => Ok(Self::HL),
            _ => Err(Z80Error::UnknownRegister(name.to_string())),
        }
    }
}

/// Maskable interrupt dispatch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterruptMode {
    /// Execute the instruction byte supplied by the device.
    #[default]
    Im0,
    /// Restart at 0x0038.
    Im1,
    /// Call through the vector table at `I * 256 + device byte`.
    Im2,
}

impl InterruptMode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Im0 => 0,
            Self::Im1 => 1,
            Self::Im2 => 2,
        }
    }
}

impl TryFrom<u8> for InterruptMode {
    type Error = Z80Error;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        match mode {
            0 => Ok(Self::Im0),
            1 => Ok(Self::Im1),
            2 => Ok(Self::Im2),
            _ => Err(Z80Error::InvalidInterruptMode(mode)),
        }
    }
}

impl fmt::Display for InterruptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IM{}", self.as_u8())
    }
}

/// Eight 8-bit registers: accumulator, flags and six general purpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterBank {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
}

impl RegisterBank {
    /// Get AF register pair.
    #[must_use]
    pub const fn af(&self) -> u16 {
        (self.a as u16) << 8 | self.f as u16
    }

    /// Get BC register pair.
    #[must_use]
    pub const fn bc(&self) -> u16 {
        (self.b as u16) << 8 | self.c as u16
    }

    /// Get DE register pair.
    #[must_use]
    pub const fn de(&self) -> u16 {
        (self.d as u16) << 8 | self.e as u16
    }

    /// Get HL register pair.
    #[must_use]
    pub const fn hl(&self) -> u16 {
        (self.h as u16) << 8 | self.l as u16
    }

    pub fn set_af(&mut self, value: u16) {
        [self.a, self.f] = value.to_be_bytes();
    }

    pub fn set_bc(&mut self, value: u16) {
        [self.b, self.c] = value.to_be_bytes();
    }

    pub fn set_de(&mut self, value: u16) {
        [self.d, self.e] = value.to_be_bytes();
    }

    pub fn set_hl(&mut self, value: u16) {
        [self.h, self.l] = value.to_be_bytes();
    }

    #[must_use]
    pub const fn get(&self, reg: Register8) -> u8 {
        match reg {
            Register8::A => self.a,
            Register8::F => self.f,
            Register8::B => self.b,
            Register8::C => self.c,
            Register8::D => self.d,
            Register8::E => self.e,
            Register8::H => self.h,
            Register8::L => self.l,
        }
    }

    pub fn set(&mut self, reg: Register8, value: u8) {
        match reg {
            Register8::A => self.a = value,
            Register8::F => self.f = value,
            Register8::B => self.b = value,
            Register8::C => self.c = value,
            Register8::D => self.d = value,
            Register8::E => self.e = value,
            Register8::H => self.h = value,
            Register8::L => self.l = value,
        }
    }

    #[must_use]
    pub const fn pair(&self, pair: RegisterPair) -> u16 {
        match pair {
            RegisterPair::AF => self.af(),
            RegisterPair::BC => self.bc(),
            RegisterPair::DE => self.de(),
            RegisterPair::HL => self.hl(),
        }
    }

    pub fn set_pair(&mut self, pair: RegisterPair, value: u16) {
        match pair {
            RegisterPair::AF => self.set_af(value),
            RegisterPair::BC => self.set_bc(value),
            RegisterPair::DE => self.set_de(value),
            RegisterPair::HL => self.set_hl(value),
        }
    }
}

/// All architectural storage of the Z80.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub main: RegisterBank,
    pub shadow: RegisterBank,

    // Index registers
    pub ix: u16,
    pub iy: u16,

    pub sp: u16,
    pub pc: u16,
    /// Interrupt vector base.
    pub i: u8,
    /// Memory refresh counter. Bit 7 is only changed by LD R,A.
    pub r: u8,

    // Interrupt state
    pub iff1: bool,
    pub iff2: bool,
    pub im: InterruptMode,
}

impl Registers {
    #[must_use]
    pub const fn bank(&self, set: RegisterSet) -> &RegisterBank {
        match set {
            RegisterSet::Main => &self.main,
            RegisterSet::Shadow => &self.shadow,
        }
    }

    pub fn bank_mut(&mut self, set: RegisterSet) -> &mut RegisterBank {
        match set {
            RegisterSet::Main => &mut self.main,
            RegisterSet::Shadow => &mut self.shadow,
        }
    }

    /// EX AF,AF'.
    pub fn swap_af(&mut self) {
        std::mem::swap(&mut self.main.a, &mut self.shadow.a);
        std::mem::swap(&mut self.main.f, &mut self.shadow.f);
    }

    /// EXX: swap BC, DE and HL with the shadow bank.
    pub fn swap_general(&mut self) {
        let main = self.main;
        let shadow = self.shadow;
        self.main = RegisterBank {
            a: main.a,
            f: main.f,
            ..shadow
        };
        self.shadow = RegisterBank {
            a: shadow.a,
            f: shadow.f,
            ..main
        };
    }

    /// Advance the low seven bits of R, keeping bit 7.
    pub fn bump_refresh(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }
}

bitflags! {
    /// Registers selected for [`Registers::align_with`].
    ///
    /// Parsed from a string of one letter per register: `AFBCDEHL` for the
    /// main bank, `afbcdehl` for the shadow bank, `X`/`x` and `Y`/`y` for the
    /// high and low halves of IX and IY, `P` for PC, `S`/`s` for the halves of
    /// SP, and `1`/`0` for main/shadow F without the carry bit. `T` is
    /// accepted and ignored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegisterMask: u32 {
        const A = 1 << 0;
        const F = 1 << 1;
        const B = 1 << 2;
        const C = 1 << 3;
        const D = 1 << 4;
        const E = 1 << 5;
        const H = 1 << 6;
        const L = 1 << 7;
        const IXH = 1 << 8;
        const IXL = 1 << 9;
        const IYH = 1 << 10;
        const IYL = 1 << 11;
        const F_EXCEPT_CARRY = 1 << 12;
        const SHADOW_F_EXCEPT_CARRY = 1 << 13;
        const PC = 1 << 14;
        const SPH = 1 << 15;
        const SPL = 1 << 16;
        const SHADOW_A = 1 << 17;
        const SHADOW_F = 1 << 18;
        const SHADOW_B = 1 << 19;
        const SHADOW_C = 1 << 20;
        const SHADOW_D = 1 << 21;
        const SHADOW_E = 1 << 22;
        const SHADOW_H = 1 << 23;
        const SHADOW_L = 1 << 24;
    }
}

/// Mask letters, in bit order.
const MASK_LETTERS: &str = "AFBCDEHLXxYy10PSsafbcdehl";

/// Bank slots in the order of their mask bits.
const BANK_ORDER: [Register8; 8] = [
    Register8::A,
    Register8::F,
    Register8::B,
    Register8::C,
    Register8::D,
    Register8::E,
    Register8::H,
    Register8::L,
];

impl FromStr for RegisterMask {
    type Err = Z80Error;

    fn from_str(letters: &str) -> Result<Self, Self::Err> {
        letters
            .chars()
            .filter(|&ch| ch != 'T')
            .try_fold(Self::empty(), |mask, ch| {
                let bit = MASK_LETTERS
                    .find(ch)
                    .ok_or(Z80Error::UnknownRegisterMask(ch))?;
                Ok(mask | Self::from_bits_retain(1 << bit))
            })
    }
}

fn with_high(word: u16, high: u8) -> u16 {
    (word & 0x00FF) | (u16::from(high) << 8)
}

fn with_low(word: u16, low: u8) -> u16 {
    (word & 0xFF00) | u16::from(low)
}

impl Registers {
    /// Copy the registers selected by `mask` from `other`.
    ///
    /// I, R, the interrupt flip-flops and the mode are not part of the mask.
    pub fn align_with(&mut self, other: &Self, mask: RegisterMask) {
        for (bit, &reg) in BANK_ORDER.iter().enumerate() {
            if mask.bits() & (1 << bit) != 0 {
                self.main.set(reg, other.main.get(reg));
            }
            if mask.bits() & (1 << (bit + 17)) != 0 {
                self.shadow.set(reg, other.shadow.get(reg));
            }
        }

        let [ix_high, ix_low] = other.ix.to_be_bytes();
        let [iy_high, iy_low] = other.iy.to_be_bytes();
        let [sp_high, sp_low] = other.sp.to_be_bytes();
        if mask.contains(RegisterMask::IXH) {
            self.ix = with_high(self.ix, ix_high);
        }
        if mask.contains(RegisterMask::IXL) {
            self.ix = with_low(self.ix, ix_low);
        }
        if mask.contains(RegisterMask::IYH) {
            self.iy = with_high(self.iy, iy_high);
        }
        if mask.contains(RegisterMask::IYL) {
            self.iy = with_low(self.iy, iy_low);
        }
        if mask.contains(RegisterMask::F_EXCEPT_CARRY) {
            self.main.f = (other.main.f & !CF) | (self.main.f & CF);
        }
        if mask.contains(RegisterMask::SHADOW_F_EXCEPT_CARRY) {
            self.shadow.f = (other.shadow.f & !CF) | (self.shadow.f & CF);
        }
        if mask.contains(RegisterMask::PC) {
            self.pc = other.pc;
        }
        if mask.contains(RegisterMask::SPH) {
            self.sp = with_high(self.sp, sp_high);
        }
        if mask.contains(RegisterMask::SPL) {
            self.sp = with_low(self.sp, sp_low);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_combine_high_then_low() {
        let mut bank = RegisterBank::default();
        bank.set_pair(RegisterPair::BC, 0x1234);
        assert_eq!(bank.b, 0x12);
        assert_eq!(bank.c, 0x34);
        assert_eq!(bank.pair(RegisterPair::BC), 0x1234);

        bank.set(Register8::H, 0xAB);
        bank.set(Register8::L, 0xCD);
        assert_eq!(bank.hl(), 0xABCD);
    }

    #[test]
    fn exx_leaves_af_alone() {
        let mut regs = Registers::default();
        regs.main.set_af(0x1111);
        regs.main.set_bc(0x2222);
        regs.shadow.set_af(0x3333);
        regs.shadow.set_bc(0x4444);

        regs.swap_general();
        assert_eq!(regs.main.af(), 0x1111);
        assert_eq!(regs.main.bc(), 0x4444);
        assert_eq!(regs.shadow.af(), 0x3333);
        assert_eq!(regs.shadow.bc(), 0x2222);

        regs.swap_af();
        assert_eq!(regs.main.af(), 0x3333);
        assert_eq!(regs.shadow.af(), 0x1111);
    }

    #[test]
    fn refresh_keeps_bit_seven() {
        let mut regs = Registers {
            r: 0xFF,
            ..Registers::default()
        };
        regs.bump_refresh();
        assert_eq!(regs.r, 0x80);
        regs.r = 0x7F;
        regs.bump_refresh();
        assert_eq!(regs.r, 0x00);
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("A".parse::<Register8>(), Ok(Register8::A));
        assert_eq!("hl".parse::<RegisterPair>(), Ok(RegisterPair::HL));
        assert_eq!(
            "ix".parse::<Register8>(),
            Err(Z80Error::UnknownRegister("ix".to_string()))
        );
    }

    #[test]
    fn interrupt_mode_validation() {
        assert_eq!(InterruptMode::try_from(2), Ok(InterruptMode::Im2));
        assert_eq!(
            InterruptMode::try_from(3),
            Err(Z80Error::InvalidInterruptMode(3))
        );
        assert_eq!(InterruptMode::Im1.to_string(), "IM1");
    }

    #[test]
    fn mask_letters_follow_bit_order() {
        let mask: RegisterMask = "AxT1Pa".parse().unwrap();
        assert_eq!(
            mask,
            RegisterMask::A
                | RegisterMask::IXL
                | RegisterMask::F_EXCEPT_CARRY
                | RegisterMask::PC
                | RegisterMask::SHADOW_A
        );
        assert_eq!("".parse::<RegisterMask>(), Ok(RegisterMask::empty()));
        assert_eq!(
            "AZ".parse::<RegisterMask>(),
            Err(Z80Error::UnknownRegisterMask('Z'))
        );
    }

    #[test]
    fn align_copies_only_selected_registers() {
        let mut source = Registers::default();
        source.main.set_af(0x12FE);
        source.main.set_hl(0x3456);
        source.shadow.set_af(0x7801);
        source.ix = 0xAABB;
        source.sp = 0xCCDD;
        source.pc = 0x4000;
        source.i = 0x99;

        let mut target = Registers::default();
        target.main.f = CF;
        target.ix = 0x1122;
        target.sp = 0x3344;

        target.align_with(&source, "AH1xS".parse().unwrap());
        assert_eq!(target.main.a, 0x12);
        assert_eq!(target.main.f, 0xFF);
        assert_eq!(target.main.h, 0x34);
        assert_eq!(target.main.l, 0x00);
        assert_eq!(target.ix, 0x11BB);
        assert_eq!(target.sp, 0xCC44);
        assert_eq!(target.pc, 0x0000);
        assert_eq!(target.shadow.af(), 0x0000);
        assert_eq!(target.i, 0x00);

        let shadow_af = RegisterMask::SHADOW_A | RegisterMask::SHADOW_F_EXCEPT_CARRY;
        target.align_with(&source, shadow_af);
        assert_eq!(target.shadow.af(), 0x7800);
    }
}
