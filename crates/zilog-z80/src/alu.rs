//! ALU operations for the Z80.
//!
//! Every operation is a pure function returning the result, the flag bits it
//! produces and the mask of flag bits it leaves untouched.

#![allow(clippy::verbose_bit_mask)] // Clearer to read mask comparisons.

use crate::flags::{CF, HF, NF, PF, SF, SZPF, XF, XYF, YF, ZF, parity, sz53, sz53p};

/// Result of an 8-bit ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    /// Flag bits produced by the operation.
    pub flags: u8,
    /// Flag bits carried over unchanged from the previous F.
    pub keep: u8,
}

impl AluResult {
    const fn new(value: u8, flags: u8) -> Self {
        Self {
            value,
            flags,
            keep: 0,
        }
    }

    const fn keeping(value: u8, flags: u8, keep: u8) -> Self {
        Self { value, flags, keep }
    }

    /// New F given the previous one.
    #[must_use]
    pub const fn apply(self, f: u8) -> u8 {
        (f & self.keep) | (self.flags & !self.keep)
    }
}

/// Result of a 16-bit ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alu16Result {
    pub value: u16,
    pub flags: u8,
    pub keep: u8,
}

impl Alu16Result {
    #[must_use]
    pub const fn apply(self, f: u8) -> u8 {
        (f & self.keep) | (self.flags & !self.keep)
    }
}

// =========================================================================
// 8-bit arithmetic and logic
// =========================================================================

/// Add two bytes with optional carry.
#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let sum = u16::from(a) + u16::from(b) + u16::from(carry);
    let value = sum as u8;

    let mut flags = sz53(value);
    // Carry out of bit 3
    flags |= (a ^ b ^ value) & HF;
    // Operands share a sign the result does not
    if (a ^ value) & (b ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if sum > 0xFF {
        flags |= CF;
    }

    AluResult::new(value, flags)
}

/// Subtract with optional borrow.
#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let diff = i16::from(a) - i16::from(b) - i16::from(carry);
    let value = diff as u8;

    let mut flags = sz53(value) | NF;
    // Borrow into bit 4
    flags |= (a ^ b ^ value) & HF;
    // Operands differ in sign and the result took the subtrahend's sign
    if (a ^ b) & (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if diff < 0 {
        flags |= CF;
    }

    AluResult::new(value, flags)
}

/// Compare: subtract for flags only; A is returned unchanged.
#[must_use]
pub fn cp8(a: u8, b: u8) -> AluResult {
    let result = sub8(a, b, false);
    // For CP, undocumented flags come from operand, not result
    AluResult::new(a, (result.flags & !XYF) | (b & XYF))
}

#[must_use]
pub fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    AluResult::new(value, sz53p(value) | HF)
}

#[must_use]
pub fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    AluResult::new(value, sz53p(value))
}

#[must_use]
pub fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    AluResult::new(value, sz53p(value))
}

/// The accumulator operation selected by the y field of an ALU opcode.
#[must_use]
pub fn accumulator_op(op: u8, a: u8, b: u8, carry: bool) -> AluResult {
    match op {
        0 => add8(a, b, false),
        1 => add8(a, b, carry),
        2 => sub8(a, b, false),
        3 => sub8(a, b, carry),
        4 => and8(a, b),
        5 => xor8(a, b),
        6 => or8(a, b),
        7 => cp8(a, b),
        _ => unreachable!("ALU operation {op} out of range"),
    }
}

/// Increment byte. Carry is preserved.
#[must_use]
pub fn inc8(a: u8) -> AluResult {
    let value = a.wrapping_add(1);

    let mut flags = sz53(value);
    if a & 0x0F == 0x0F {
        flags |= HF;
    }
    if a == 0x7F {
        flags |= PF; // Overflow
    }

    AluResult::keeping(value, flags, CF)
}

/// Decrement byte. Carry is preserved.
#[must_use]
pub fn dec8(a: u8) -> AluResult {
    let value = a.wrapping_sub(1);

    let mut flags = sz53(value) | NF;
    if a & 0x0F == 0x00 {
        flags |= HF;
    }
    if a == 0x80 {
        flags |= PF; // Overflow
    }

    AluResult::keeping(value, flags, CF)
}

/// NEG: A = 0 - A.
#[must_use]
pub fn neg8(a: u8) -> AluResult {
    sub8(0, a, false)
}

// =========================================================================
// Accumulator specials
// =========================================================================

/// Additive BCD correction for DAA.
///
/// One of 0x00, 0x06, 0x60, 0x66 after an addition, or their two's
/// complements 0xFA, 0xA0, 0x9A after a subtraction.
#[must_use]
pub const fn daa_correction(a: u8, f: u8) -> u8 {
    let mut correction: u8 = 0;
    if a & 0x0F > 0x09 || f & HF != 0 {
        correction |= 0x06;
    }
    if a > 0x99 || f & CF != 0 {
        correction |= 0x60;
    }
    if f & NF != 0 {
        correction.wrapping_neg()
    } else {
        correction
    }
}

/// Decimal adjust A.
#[must_use]
pub fn daa(a: u8, f: u8) -> AluResult {
    let correction = daa_correction(a, f);
    let value = a.wrapping_add(correction);

    let mut flags = sz53p(value);
    // Carry or borrow across bit 3 while applying the correction
    flags |= (a ^ value) & HF;
    if a > 0x99 || f & CF != 0 {
        flags |= CF;
    }

    AluResult::keeping(value, flags, NF)
}

/// CPL: complement A. Only H and N are written.
#[must_use]
pub fn cpl(a: u8) -> AluResult {
    AluResult::keeping(!a, HF | NF, SZPF | XYF | CF)
}

/// SCF. `q` is the F value written by the previous instruction, or 0 if it
/// wrote none.
#[must_use]
pub fn scf(a: u8, f: u8, q: u8) -> AluResult {
    AluResult::keeping(a, (((q ^ f) | a) & XYF) | CF, SZPF)
}

/// CCF. H receives the old carry.
#[must_use]
pub fn ccf(a: u8, f: u8, q: u8) -> AluResult {
    let carry = if f & CF != 0 { HF } else { CF };
    AluResult::keeping(a, (((q ^ f) | a) & XYF) | carry, SZPF)
}

/// RLCA. S, Z and P/V are preserved.
#[must_use]
pub fn rlca(a: u8) -> AluResult {
    let value = a.rotate_left(1);
    AluResult::keeping(value, (value & XYF) | (a >> 7), SZPF)
}

/// RRCA. S, Z and P/V are preserved.
#[must_use]
pub fn rrca(a: u8) -> AluResult {
    let value = a.rotate_right(1);
    AluResult::keeping(value, (value & XYF) | (a & CF), SZPF)
}

/// RLA. S, Z and P/V are preserved.
#[must_use]
pub fn rla(a: u8, carry: bool) -> AluResult {
    let value = (a << 1) | u8::from(carry);
    AluResult::keeping(value, (value & XYF) | (a >> 7), SZPF)
}

/// RRA. S, Z and P/V are preserved.
#[must_use]
pub fn rra(a: u8, carry: bool) -> AluResult {
    let value = (a >> 1) | (u8::from(carry) << 7);
    AluResult::keeping(value, (value & XYF) | (a & CF), SZPF)
}

// =========================================================================
// CB rotates, shifts and bit tests
// =========================================================================

fn shifted(value: u8, carry_out: u8) -> AluResult {
    AluResult::new(value, sz53p(value) | (carry_out & CF))
}

/// Rotate left circular (bit 7 -> carry and bit 0).
#[must_use]
pub fn rlc8(a: u8) -> AluResult {
    shifted(a.rotate_left(1), a >> 7)
}

/// Rotate right circular (bit 0 -> carry and bit 7).
#[must_use]
pub fn rrc8(a: u8) -> AluResult {
    shifted(a.rotate_right(1), a)
}

/// Rotate left through carry.
#[must_use]
pub fn rl8(a: u8, carry: bool) -> AluResult {
    shifted((a << 1) | u8::from(carry), a >> 7)
}

/// Rotate right through carry.
#[must_use]
pub fn rr8(a: u8, carry: bool) -> AluResult {
    shifted((a >> 1) | (u8::from(carry) << 7), a)
}

/// Shift left arithmetic (bit 0 = 0).
#[must_use]
pub fn sla8(a: u8) -> AluResult {
    shifted(a << 1, a >> 7)
}

/// Shift right arithmetic (bit 7 preserved).
#[must_use]
pub fn sra8(a: u8) -> AluResult {
    shifted((a >> 1) | (a & 0x80), a)
}

/// Shift left logical (undocumented SLL - bit 0 = 1).
#[must_use]
pub fn sll8(a: u8) -> AluResult {
    shifted((a << 1) | 1, a >> 7)
}

/// Shift right logical (bit 7 = 0).
#[must_use]
pub fn srl8(a: u8) -> AluResult {
    shifted(a >> 1, a)
}

/// The rotate/shift selected by the y field of a CB opcode.
#[must_use]
pub fn rotate_shift(op: u8, a: u8, carry: bool) -> AluResult {
    match op {
        0 => rlc8(a),
        1 => rrc8(a),
        2 => rl8(a, carry),
        3 => rr8(a, carry),
        4 => sla8(a),
        5 => sra8(a),
        6 => sll8(a),
        7 => srl8(a),
        _ => unreachable!("shift operation {op} out of range"),
    }
}

/// BIT n. X and Y come from `xy_source`: the operand for registers, the high
/// byte of the effective address for memory operands. Carry is preserved.
#[must_use]
pub fn bit(n: u8, value: u8, xy_source: u8) -> AluResult {
    let mut flags = HF | (xy_source & XYF);
    if value & (1 << n) == 0 {
        flags |= ZF | PF;
    }
    if n == 7 && value & 0x80 != 0 {
        flags |= SF;
    }
    AluResult::keeping(value, flags, CF)
}

// =========================================================================
// 16-bit arithmetic
// =========================================================================

/// 16-bit add for HL/IX/IY. S, Z and P/V are preserved.
#[must_use]
pub fn add16(a: u16, b: u16) -> Alu16Result {
    let sum = u32::from(a) + u32::from(b);
    let value = sum as u16;

    // Undocumented flags from high byte of result
    let mut flags = (value >> 8) as u8 & XYF;
    // Half-carry from bit 11
    if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
        flags |= HF;
    }
    if sum > 0xFFFF {
        flags |= CF;
    }

    Alu16Result {
        value,
        flags,
        keep: SZPF,
    }
}

fn wide_flags(value: u16, carries: u16) -> u8 {
    let high = (value >> 8) as u8;
    let mut flags = high & (SF | XYF);
    if value == 0 {
        flags |= ZF;
    }
    flags | ((carries >> 8) as u8 & HF)
}

/// 16-bit add with carry for HL.
#[must_use]
pub fn adc16(a: u16, b: u16, carry: bool) -> Alu16Result {
    let sum = u32::from(a) + u32::from(b) + u32::from(carry);
    let value = sum as u16;

    let mut flags = wide_flags(value, a ^ b ^ value);
    if (a ^ value) & (b ^ value) & 0x8000 != 0 {
        flags |= PF;
    }
    if sum > 0xFFFF {
        flags |= CF;
    }

    Alu16Result {
        value,
        flags,
        keep: 0,
    }
}

/// 16-bit subtract with borrow for HL.
#[must_use]
pub fn sbc16(a: u16, b: u16, carry: bool) -> Alu16Result {
    let diff = i32::from(a) - i32::from(b) - i32::from(carry);
    let value = diff as u16;

    let mut flags = wide_flags(value, a ^ b ^ value) | NF;
    if (a ^ b) & (a ^ value) & 0x8000 != 0 {
        flags |= PF;
    }
    if diff < 0 {
        flags |= CF;
    }

    Alu16Result {
        value,
        flags,
        keep: 0,
    }
}

// =========================================================================
// Block instruction flags
// =========================================================================

/// Flags for LDI/LDD given the byte moved, A and the decremented BC.
#[must_use]
pub fn block_transfer_flags(moved: u8, a: u8, bc: u16) -> AluResult {
    let n = moved.wrapping_add(a);
    let mut flags = (n & XF) | ((n << 4) & YF);
    if bc != 0 {
        flags |= PF;
    }
    AluResult::keeping(moved, flags, SF | ZF | CF)
}

/// Flags for CPI/CPD given A, the byte compared and the decremented BC.
#[must_use]
pub fn block_compare_flags(a: u8, m: u8, bc: u16) -> AluResult {
    let diff = a.wrapping_sub(m);
    let half = (a ^ m ^ diff) & HF;
    let n = diff.wrapping_sub(u8::from(half != 0));

    let mut flags = NF | half | (sz53(diff) & (SF | ZF));
    flags |= (n & XF) | ((n << 4) & YF);
    if bc != 0 {
        flags |= PF;
    }
    AluResult::keeping(diff, flags, CF)
}

/// Flags for INI/IND/OUTI/OUTD.
///
/// `value` is the byte transferred, `addend` the adjusted C (input forms) or
/// the updated L (output forms), `b` the decremented B.
#[must_use]
pub fn block_io_flags(value: u8, addend: u8, b: u8) -> AluResult {
    let k = u16::from(value) + u16::from(addend);

    let mut flags = sz53(b);
    if value & 0x80 != 0 {
        flags |= NF;
    }
    if k > 0xFF {
        flags |= HF | CF;
    }
    if parity((k as u8 & 0x07) ^ b) {
        flags |= PF;
    }
    AluResult::new(b, flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_half_carry_and_overflow() {
        let r = add8(0x0F, 0x01, false);
        assert_eq!(r.value, 0x10);
        assert_eq!(r.flags, HF);

        let r = add8(0x7F, 0x01, false);
        assert_eq!(r.value, 0x80);
        assert_eq!(r.flags, SF | HF | PF);

        let r = add8(0xFF, 0x00, true);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags, ZF | HF | CF);
    }

    #[test]
    fn sub_borrow_and_overflow() {
        let r = sub8(0x80, 0x01, false);
        assert_eq!(r.value, 0x7F);
        assert_eq!(r.flags, NF | HF | PF | YF | XF);

        let r = sub8(0x00, 0x01, false);
        assert_eq!(r.value, 0xFF);
        assert_eq!(r.flags, SF | YF | XF | HF | NF | CF);
    }

    #[test]
    fn cp_takes_xy_from_operand() {
        let r = cp8(0x40, 0x28);
        assert_eq!(r.value, 0x40);
        assert_eq!(r.flags & XYF, XYF);
        assert_eq!(r.flags & ZF, 0);
        assert_eq!(cp8(0x10, 0x10).flags & ZF, ZF);
    }

    #[test]
    fn logic_sets_parity() {
        assert_eq!(and8(0xF0, 0x0F).flags, ZF | PF | HF);
        assert_eq!(xor8(0xFF, 0xFE).flags, 0);
        assert_eq!(or8(0x80, 0x01).flags, SF | PF);
    }

    #[test]
    fn inc_dec_preserve_carry() {
        let r = inc8(0x7F);
        assert_eq!(r.flags, SF | HF | PF);
        assert_eq!(r.apply(CF), SF | HF | PF | CF);

        let r = dec8(0x80);
        assert_eq!(r.value, 0x7F);
        assert_eq!(r.apply(CF), NF | HF | PF | YF | XF | CF);
    }

    #[test]
    fn add16_keeps_sign_zero_overflow() {
        let r = add16(0x0001, 0x0001);
        assert_eq!(r.value, 0x0002);
        assert_eq!(r.apply(0xFF), SF | ZF | PF);

        let r = add16(0x0FFF, 0xF001);
        assert_eq!(r.value, 0x0000);
        assert_eq!(r.flags, HF | CF);
    }

    #[test]
    fn adc16_and_sbc16_write_all_flags() {
        let r = adc16(0x7FFF, 0x0000, true);
        assert_eq!(r.value, 0x8000);
        assert_eq!(r.apply(0), SF | HF | PF);

        let r = sbc16(0x0000, 0x0000, true);
        assert_eq!(r.value, 0xFFFF);
        assert_eq!(r.apply(0), SF | YF | XF | HF | NF | CF);

        let r = sbc16(0x1234, 0x1234, false);
        assert_eq!(r.apply(CF), ZF | NF);
    }

    #[test]
    fn accumulator_rotates_keep_sign_zero_parity() {
        let r = rlca(0x81);
        assert_eq!(r.value, 0x03);
        assert_eq!(r.apply(SF | ZF | PF | HF | NF), SF | ZF | PF | CF);

        let r = rra(0x01, false);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.apply(0), CF);
    }

    #[test]
    fn cb_shifts() {
        assert_eq!(rlc8(0x80).value, 0x01);
        assert_eq!(rlc8(0x80).flags, CF);
        assert_eq!(sra8(0x81).value, 0xC0);
        assert_eq!(sll8(0x00).value, 0x01);
        assert_eq!(srl8(0x01).flags, ZF | PF | CF);
        assert_eq!(rotate_shift(3, 0x00, true).value, 0x80);
    }

    #[test]
    fn bit_seven_sets_sign() {
        let r = bit(7, 0x80, 0x80);
        assert_eq!(r.apply(0), SF | HF);

        let r = bit(0, 0x00, 0x28);
        assert_eq!(r.apply(CF), ZF | PF | HF | YF | XF | CF);
    }

    #[test]
    fn daa_after_add_and_sub() {
        // 0x15 + 0x27 = 0x3C -> 0x42
        let r = daa(0x3C, 0);
        assert_eq!(r.value, 0x42);
        assert_eq!(r.flags & (CF | HF), HF);

        // 0x99 + 0x01 = 0x9A -> 0x00 with carry
        let r = daa(0x9A, 0);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags & (ZF | CF), ZF | CF);

        // 0x42 - 0x15 = 0x2D (H set) -> 0x27
        let r = daa(0x2D, NF | HF);
        assert_eq!(r.value, 0x27);
        assert_eq!(r.apply(NF | HF) & (NF | CF), NF);
    }

    #[test]
    fn daa_corrections_come_from_fixed_set() {
        for a in 0..=0xFFu8 {
            for f in [0, HF, CF, HF | CF, NF, NF | HF, NF | CF, NF | HF | CF] {
                let c = daa_correction(a, f);
                assert!([0x00, 0x06, 0x60, 0x66, 0x9A, 0xA0, 0xFA].contains(&c));
            }
        }
    }

    #[test]
    fn daa_correction_negates_after_subtraction() {
        const AFTER_BORROW: u8 = daa_correction(0xFF, NF);
        assert_eq!(AFTER_BORROW, 0x9A);
        assert_eq!(daa_correction(0x0F, NF), 0xFA);
        assert_eq!(daa_correction(0xA0, NF), 0xA0);
        assert_eq!(daa_correction(0x0F, 0), 0x06);
        assert_eq!(daa_correction(0x12, NF), 0x00);
    }

    #[test]
    fn cpl_only_writes_h_and_n() {
        let r = cpl(0x00);
        assert_eq!(r.value, 0xFF);
        assert_eq!(r.apply(0x00), HF | NF);
    }

    #[test]
    fn scf_ccf_undocumented_bits() {
        // Previous instruction wrote flags: X/Y come from A only
        let f = SF | XYF;
        assert_eq!(scf(0x00, f, f).apply(f), SF | CF);
        // Previous instruction left flags alone: X/Y are F | A
        assert_eq!(scf(0x00, f, 0).apply(f), SF | XYF | CF);
        assert_eq!(ccf(0x28, CF, CF).apply(CF), HF | XYF);
    }

    #[test]
    fn block_flags() {
        let r = block_transfer_flags(0x02, 0x00, 1);
        assert_eq!(r.apply(CF), YF | PF | CF);

        let r = block_compare_flags(0x10, 0x10, 0);
        assert_eq!(r.apply(0), ZF | NF);

        let r = block_io_flags(0x80, 0x80, 0x00);
        assert_eq!(r.flags, ZF | NF | HF | CF | PF);
    }
}
