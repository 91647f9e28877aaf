//! Control lines sampled and driven by the CPU.
//!
//! All lines are active-low: a set bit means the line is high (inactive).

use bitflags::bitflags;

bitflags! {
    /// Input lines sampled once per step.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InputSignals: u8 {
        /// /INT - maskable interrupt request.
        const INT = 1;
        /// /NMI - non-maskable interrupt request.
        const NMI = 2;
        /// /RESET.
        const RESET = 4;
        /// /WAIT - stretch the current cycle.
        const WAIT = 8;
    }
}

bitflags! {
    /// Output lines latched by the CPU.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OutputSignals: u8 {
        /// /M1 - opcode fetch in progress.
        const M1 = 1;
        /// /HALT - the CPU is executing HALT.
        const HALT = 2;
    }
}

impl InputSignals {
    /// Every line high.
    pub const INACTIVE: Self = Self::all();

    /// All lines high except `lines`, which are pulled low.
    #[must_use]
    pub const fn asserting(lines: Self) -> Self {
        Self::all().difference(lines)
    }

    /// True if every line in `lines` is pulled low.
    #[must_use]
    pub const fn is_asserted(self, lines: Self) -> bool {
        self.intersection(lines).is_empty()
    }

    /// True if `line` was high in `previous` and is low now.
    #[must_use]
    pub const fn fell(self, previous: Self, line: Self) -> bool {
        previous.contains(line) && !self.contains(line)
    }
}

impl Default for InputSignals {
    fn default() -> Self {
        Self::INACTIVE
    }
}

impl OutputSignals {
    /// Every line high.
    pub const INACTIVE: Self = Self::all();

    #[must_use]
    pub const fn is_asserted(self, lines: Self) -> bool {
        self.intersection(lines).is_empty()
    }
}

impl Default for OutputSignals {
    fn default() -> Self {
        Self::INACTIVE
    }
}
