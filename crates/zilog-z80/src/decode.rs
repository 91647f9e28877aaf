//! Opcode bit fields.
//!
//! ```text
//!   7 6 5 4 3 2 1 0
//!  | x |  y  |  z  |
//!      | p |q|
//! ```

/// An opcode byte split into its x/y/z/p/q fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub x: u8,
    pub y: u8,
    pub z: u8,
    pub p: u8,
    pub q: u8,
}

impl Opcode {
    #[must_use]
    pub const fn new(byte: u8) -> Self {
        Self {
            x: byte >> 6,
            y: (byte >> 3) & 7,
            z: byte & 7,
            p: (byte >> 4) & 3,
            q: (byte >> 3) & 1,
        }
    }
}
