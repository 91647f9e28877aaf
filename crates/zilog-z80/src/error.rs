//! Errors returned by the host-facing accessors.
//!
//! Stepping itself never fails; these only come from validating values a
//! host hands in, such as a mode byte read from a snapshot file.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Z80Error {
    #[error("invalid interrupt mode {0} (expected 0, 1 or 2)")]
    InvalidInterruptMode(u8),

    #[error("unknown register name {0:?}")]
    UnknownRegister(String),

    #[error("unknown register mask letter {0:?}")]
    UnknownRegisterMask(char),
}
