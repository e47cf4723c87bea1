use std::fmt;

use crate::{NumError, SizeCheck, Truncated};

/// Assembler integer. Values that fit in an `i64` stay on the fast path;
/// wider intermediates (e.g. 64-bit unsigned constants, shifted products)
/// spill to `i128`, which covers every field width the core can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntNum {
    Small(i64),
    Wide(i128),
}

impl IntNum {
    pub const ZERO: IntNum = IntNum::Small(0);

    pub fn new(value: i64) -> Self {
        Self::Small(value)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_i128(value as i128)
    }

    pub fn from_i128(value: i128) -> Self {
        match i64::try_from(value) {
            Ok(small) => Self::Small(small),
            Err(_) => Self::Wide(value),
        }
    }

    pub fn as_i128(self) -> i128 {
        match self {
            Self::Small(value) => i128::from(value),
            Self::Wide(value) => value,
        }
    }

    /// Value as `i64`, or `None` if it does not fit.
    pub fn to_i64(self) -> Option<i64> {
        match self {
            Self::Small(value) => Some(value),
            Self::Wide(value) => i64::try_from(value).ok(),
        }
    }

    /// Value clamped into the `i64` range. The optimizer uses the clamped
    /// form where an out-of-range distance just means "longest form".
    pub fn to_i64_saturating(self) -> i64 {
        match self {
            Self::Small(value) => value,
            Self::Wide(value) => {
                if value > i128::from(i64::MAX) {
                    i64::MAX
                } else if value < i128::from(i64::MIN) {
                    i64::MIN
                } else {
                    value as i64
                }
            }
        }
    }

    pub fn to_u64(self) -> Option<u64> {
        u64::try_from(self.as_i128()).ok()
    }

    pub fn is_zero(self) -> bool {
        self.as_i128() == 0
    }

    pub fn is_negative(self) -> bool {
        self.as_i128() < 0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, NumError> {
        self.as_i128()
            .checked_add(rhs.as_i128())
            .map(Self::from_i128)
            .ok_or(NumError::Overflow)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, NumError> {
        self.as_i128()
            .checked_sub(rhs.as_i128())
            .map(Self::from_i128)
            .ok_or(NumError::Overflow)
    }

    pub fn checked_mul(self, rhs: Self) -> Result<Self, NumError> {
        self.as_i128()
            .checked_mul(rhs.as_i128())
            .map(Self::from_i128)
            .ok_or(NumError::Overflow)
    }

    pub fn checked_div(self, rhs: Self) -> Result<Self, NumError> {
        if rhs.is_zero() {
            return Err(NumError::DivisionByZero);
        }
        self.as_i128()
            .checked_div(rhs.as_i128())
            .map(Self::from_i128)
            .ok_or(NumError::Overflow)
    }

    pub fn checked_rem(self, rhs: Self) -> Result<Self, NumError> {
        if rhs.is_zero() {
            return Err(NumError::DivisionByZero);
        }
        self.as_i128()
            .checked_rem(rhs.as_i128())
            .map(Self::from_i128)
            .ok_or(NumError::Overflow)
    }

    pub fn checked_neg(self) -> Result<Self, NumError> {
        self.as_i128()
            .checked_neg()
            .map(Self::from_i128)
            .ok_or(NumError::Overflow)
    }

    pub fn checked_shl(self, rhs: Self) -> Result<Self, NumError> {
        let amount = rhs.to_i64().filter(|&a| (0..128).contains(&a)).ok_or(NumError::Overflow)?;
        self.as_i128()
            .checked_shl(amount as u32)
            .map(Self::from_i128)
            .ok_or(NumError::Overflow)
    }

    pub fn checked_shr(self, rhs: Self) -> Result<Self, NumError> {
        let amount = rhs.to_i64().filter(|&a| (0..128).contains(&a)).ok_or(NumError::Overflow)?;
        Ok(Self::from_i128(self.as_i128() >> amount as u32))
    }

    pub fn bit_and(self, rhs: Self) -> Self {
        Self::from_i128(self.as_i128() & rhs.as_i128())
    }

    pub fn bit_or(self, rhs: Self) -> Self {
        Self::from_i128(self.as_i128() | rhs.as_i128())
    }

    pub fn bit_xor(self, rhs: Self) -> Self {
        Self::from_i128(self.as_i128() ^ rhs.as_i128())
    }

    pub fn bit_not(self) -> Self {
        Self::from_i128(!self.as_i128())
    }

    /// Whether the value fits in `size_bits` bits under the given check.
    /// `SizeCheck::None` accepts either interpretation, matching the usual
    /// assembler convention that `db -1` and `db 0xFF` are both fine.
    pub fn fits(self, size_bits: u32, check: SizeCheck) -> bool {
        debug_assert!(size_bits >= 1 && size_bits <= 64);
        let value = self.as_i128();
        let signed_ok = {
            let min = -(1i128 << (size_bits - 1));
            let max = (1i128 << (size_bits - 1)) - 1;
            value >= min && value <= max
        };
        let unsigned_ok = value >= 0 && value < (1i128 << size_bits);
        match check {
            SizeCheck::None => signed_ok || unsigned_ok,
            SizeCheck::Signed => signed_ok,
            SizeCheck::Unsigned => unsigned_ok,
        }
    }

    /// Truncate to the low `size_bits` bits (two's complement), reporting
    /// whether anything was lost under the given check.
    pub fn truncate(self, size_bits: u32, check: SizeCheck) -> (u64, Option<Truncated>) {
        debug_assert!(size_bits >= 1 && size_bits <= 64);
        let mask: u128 = (1u128 << size_bits) - 1;
        let bits = (self.as_i128() as u128) & mask;
        let warning = if self.fits(size_bits, check) {
            None
        } else {
            Some(Truncated {
                size_bits,
                signed: check == SizeCheck::Signed,
            })
        };
        (bits as u64, warning)
    }
}

impl Default for IntNum {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<i64> for IntNum {
    fn from(value: i64) -> Self {
        Self::Small(value)
    }
}

impl fmt::Display for IntNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i128())
    }
}
