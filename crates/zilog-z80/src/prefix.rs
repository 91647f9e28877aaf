//! Opcode prefix state carried between steps.

/// Which decode table the next fetched byte is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Prefix {
    #[default]
    None,
    Cb,
    Ed,
    /// IX replaces HL.
    Dd,
    /// IY replaces HL.
    Fd,
    /// DD CB: a displacement byte, then the opcode.
    DdCb,
    /// FD CB: a displacement byte, then the opcode.
    FdCb,
}

/// Index register selected by a DD or FD prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    Ix,
    Iy,
}

impl Prefix {
    /// The prefix that `byte` leads to, or `None` if `byte` is an opcode in
    /// the current table.
    ///
    /// Only the unprefixed and DD/FD tables contain prefix bytes. A DD or FD
    /// following another DD or FD replaces it; ED cancels it.
    #[must_use]
    pub const fn after(self, byte: u8) -> Option<Self> {
        match self {
            Self::None | Self::Dd | Self::Fd => match byte {
                0xDD => Some(Self::Dd),
                0xFD => Some(Self::Fd),
                0xED => Some(Self::Ed),
                0xCB => Some(match self {
                    Self::Dd => Self::DdCb,
                    Self::Fd => Self::FdCb,
                    _ => Self::Cb,
                }),
                _ => None,
            },
            Self::Cb | Self::Ed | Self::DdCb | Self::FdCb => None,
        }
    }

    /// Index register substituted for HL, if any.
    #[must_use]
    pub const fn index(self) -> Option<Index> {
        match self {
            Self::Dd | Self::DdCb => Some(Index::Ix),
            Self::Fd | Self::FdCb => Some(Index::Iy),
            Self::None | Self::Cb | Self::Ed => None,
        }
    }

    /// True for DD CB / FD CB, whose trailing bytes are not opcode fetches.
    #[must_use]
    pub const fn is_indexed_bit_op(self) -> bool {
        matches!(self, Self::DdCb | Self::FdCb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprefixed_transitions() {
        assert_eq!(Prefix::None.after(0xCB), Some(Prefix::Cb));
        assert_eq!(Prefix::None.after(0xED), Some(Prefix::Ed));
        assert_eq!(Prefix::None.after(0xDD), Some(Prefix::Dd));
        assert_eq!(Prefix::None.after(0xFD), Some(Prefix::Fd));
        assert_eq!(Prefix::None.after(0x00), None);
    }

    #[test]
    fn index_prefixes_chain() {
        assert_eq!(Prefix::Dd.after(0xCB), Some(Prefix::DdCb));
        assert_eq!(Prefix::Fd.after(0xCB), Some(Prefix::FdCb));
        assert_eq!(Prefix::Dd.after(0xFD), Some(Prefix::Fd));
        assert_eq!(Prefix::Fd.after(0xED), Some(Prefix::Ed));
        assert_eq!(Prefix::Dd.after(0x21), None);
    }

    #[test]
    fn terminal_tables_have_no_prefixes() {
        for byte in [0xCB, 0xDD, 0xED, 0xFD] {
            assert_eq!(Prefix::Cb.after(byte), None);
            assert_eq!(Prefix::Ed.after(byte), None);
            assert_eq!(Prefix::DdCb.after(byte), None);
            assert_eq!(Prefix::FdCb.after(byte), None);
        }
    }

    #[test]
    fn index_selection() {
        assert_eq!(Prefix::DdCb.index(), Some(Index::Ix));
        assert_eq!(Prefix::Fd.index(), Some(Index::Iy));
        assert_eq!(Prefix::Ed.index(), None);
        assert!(Prefix::FdCb.is_indexed_bit_op());
        assert!(!Prefix::Fd.is_indexed_bit_op());
    }
}
