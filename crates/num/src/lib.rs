mod bytes;
mod intnum;

use thiserror::Error;

pub use bytes::Bytes;
pub use intnum::IntNum;

/// Truncation warning classes for size-bounded writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeCheck {
    /// No range checking.
    #[default]
    None,
    /// Warn when the value does not fit as a signed quantity.
    Signed,
    /// Warn when the value does not fit as an unsigned quantity.
    Unsigned,
}

/// Raised by a checked write when the value had to be truncated to fit.
/// Callers decide whether this becomes a warning or is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncated {
    pub size_bits: u32,
    pub signed: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NumError {
    #[error("bit count {bits} is not a multiple of 8 in range 8..=64")]
    InvalidBitCount { bits: u32 },
    #[error("bit field of {size_bits} bits shifted by {shift} exceeds 128 bits")]
    FieldTooWide { size_bits: u32, shift: u32 },
    #[error("bit field extends past end of buffer")]
    FieldOutOfBounds,
    #[error("unexpected end of buffer")]
    UnexpectedEof,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("division by zero")]
    DivisionByZero,
}
