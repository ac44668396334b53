// ============================================================================
// BPF-Safe 128-bit Types
// ============================================================================
//
// SBF keeps 8-byte alignment for i128/u128 while newer x86_64 toolchains use
// 16. Rates and step thresholds live inside the slab, so they are stored as
// [lo, hi] u64 pairs to keep one layout across targets.

use bytemuck::{Pod, Zeroable};

/// Unsigned 128-bit value stored as `[lo, hi]`.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct U128([u64; 2]);

impl U128 {
    pub const ZERO: Self = Self([0, 0]);

    #[inline]
    pub const fn new(val: u128) -> Self {
        Self([val as u64, (val >> 64) as u64])
    }

    #[inline]
    pub const fn get(self) -> u128 {
        ((self.0[1] as u128) << 64) | (self.0[0] as u128)
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == [0, 0]
    }
}

impl Default for U128 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl core::fmt::Debug for U128 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "U128({})", self.get())
    }
}

/// Signed 128-bit value stored as `[lo, hi]`, sign carried in `hi`.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct I128([u64; 2]);

impl I128 {
    pub const ZERO: Self = Self([0, 0]);

    #[inline]
    pub const fn new(val: i128) -> Self {
        Self([val as u64, (val >> 64) as u64])
    }

    #[inline]
    pub const fn get(self) -> i128 {
        ((self.0[1] as i128) << 64) | (self.0[0] as u128 as i128)
    }
}

impl Default for I128 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl core::fmt::Debug for I128 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "I128({})", self.get())
    }
}
