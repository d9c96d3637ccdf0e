//! Wire value wrappers.
//!
//! A plain `u32` always costs 32 bits. These wrappers attach a bit width
//! to the *type* so that an RPC argument declared as `Int<5>` costs five
//! bits and a `RangedU32<0, 9>` costs four, with no per-call bookkeeping.
//! They are `Copy` value types and implement [`Marshal`](crate::Marshal).

use crate::bitstream::ranged_bit_count;

/// Unsigned integer stored in `N` bits. Wider values truncate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Int<const N: u32>(pub u32);

/// Two's complement integer stored in `N` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SignedInt<const N: u32>(pub i32);

/// `[0, 1]` quantized onto `N` bits.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Float<const N: u32>(pub f32);

/// `[-1, 1]` quantized onto `N` bits.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignedFloat<const N: u32>(pub f32);

/// Unsigned integer in `MIN..=MAX`, stored in `ceil(log2(MAX-MIN+1))` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangedU32<const MIN: u32, const MAX: u32>(pub u32);

impl<const N: u32> Int<N> {
    pub const BITS: u32 = N;
}

impl<const N: u32> SignedInt<N> {
    pub const BITS: u32 = N;
}

impl<const MIN: u32, const MAX: u32> RangedU32<MIN, MAX> {
    pub fn bits() -> u32 {
        ranged_bit_count(MIN, MAX)
    }
}

impl<const MIN: u32, const MAX: u32> Default for RangedU32<MIN, MAX> {
    fn default() -> Self {
        Self(MIN)
    }
}
