//! Cycle counter shared by a CPU core and the hardware synchronised to it.

use crate::Ticks;

/// Monotonic cycle counter.
///
/// Every bus access and internal step charges the clock at the call site.
/// The counter never goes backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clock {
    elapsed: Ticks,
}

impl Clock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            elapsed: Ticks::ZERO,
        }
    }

    /// Charge `cycles` to the counter.
    pub fn advance(&mut self, cycles: u32) {
        self.elapsed += Ticks::new(u64::from(cycles));
    }

    /// Cycles elapsed since the clock was created.
    #[must_use]
    pub const fn read(&self) -> Ticks {
        self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_accumulates() {
        let mut clock = Clock::new();
        clock.advance(4);
        clock.advance(3);
        clock.advance(0);
        assert_eq!(clock.read(), Ticks::new(7));
    }

    #[test]
    fn elapsed_since_snapshot() {
        let mut clock = Clock::new();
        clock.advance(9);
        let start = clock.read();
        clock.advance(11);
        assert_eq!(clock.read() - start, Ticks::new(11));
    }
}
