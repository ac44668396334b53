//! Conversion-rate engine for an automated token reserve.
//!
//! Quotes combine four ingredients:
//! 1. A slowly updated base buy/sell rate per token (precision 10^18)
//! 2. Fast per-block compact deltas, packed 14 tokens to a bucket
//! 3. A quantity step function
//! 4. An imbalance step function over the net volume since the last rate update
//!
//! Per-block and cumulative imbalance caps turn a quote into zero instead of
//! failing. All state lives in one zero-copy `ConversionRates` block that the
//! program maps straight out of the rates slab.

pub mod compact;
pub mod imbalance;
pub mod math;
pub mod quote;
pub mod step;
pub mod tokens;
pub mod wide;

pub use compact::CompactBucket;
pub use imbalance::{ImbalanceLedger, ImbalanceSlot};
pub use step::{StepCommand, StepFunction};
pub use tokens::{TokenControlInfo, TokenData};
pub use wide::{I128, U128};

use bytemuck::{Pod, Zeroable};

// ============================================================================
// Constants
// ============================================================================

/// Token table capacity (listed plus control-info-only entries).
pub const MAX_TOKENS: usize = 64;

/// Tokens sharing one compact bucket.
pub const BUCKET_SIZE: usize = 14;

/// Buckets needed to cover every possible ordinal.
pub const NUM_BUCKETS: usize = (MAX_TOKENS + BUCKET_SIZE - 1) / BUCKET_SIZE;

/// Maximum steps per side of a step function.
pub const MAX_STEPS: usize = 10;

/// Blocks of per-block imbalance history kept per token.
pub const SLIDING_WINDOW_SIZE: usize = 5;

/// Fixed-point unit of every rate.
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Sanity ceiling on rates (10^25).
pub const MAX_RATE: u128 = PRECISION * 10_000_000;

/// Sanity ceiling on token quantities (10^28).
pub const MAX_QTY: u128 = PRECISION * 10_000_000_000;

pub const MAX_DECIMALS: u8 = 18;

pub const BPS: i128 = 10_000;
pub const MIN_BPS_ADJUSTMENT: i64 = -10_000;
pub const MAX_BPS_ADJUSTMENT: i64 = 100_000_000_000;

/// Compact deltas are stored in tenths of the applied bps.
pub const COMPACT_BPS_MULTIPLIER: i64 = 10;

// ============================================================================
// Errors
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateError {
    /// Caller lacks the role the operation requires
    Unauthorized,

    /// Token was never listed
    UnlistedToken,

    /// Token must be listed before trading can be enabled
    NotListed,

    /// Token is listed already
    AlreadyListed,

    /// Trading needs control info first
    ControlInfoRequired,

    /// Resolution or an imbalance cap is zero
    ZeroParameter,

    /// Arithmetic overflow
    Overflow,

    /// Value does not fit the persisted signed width
    CastOverflow,

    /// Rate is above MAX_RATE or zero where a divisor is needed
    InvalidRate,

    /// Bps adjustment outside [MIN_BPS_ADJUSTMENT, MAX_BPS_ADJUSTMENT]
    BpsOutOfRange,

    /// Quantity above MAX_QTY
    InvalidQuantity,

    /// Decimals above MAX_DECIMALS
    InvalidDecimals,

    /// Parallel input arrays differ in length
    LengthMismatch,

    /// Step function longer than MAX_STEPS
    TooManySteps,

    /// Step thresholds decrease
    StepsNotMonotonic,

    /// Unknown step-function command id
    InvalidCommand,

    /// Bucket index or step cell out of range
    InvalidIndices,

    /// Block number does not fit 32 bits
    BlockOverflow,

    /// No free entry in the token table
    TokenTableFull,
}

pub type Result<T> = core::result::Result<T, RateError>;

// ============================================================================
// Access control
// ============================================================================

/// Capability checks for gated operations. The engine never stores roles; the
/// host decides who holds them.
pub trait AccessControl {
    fn is_admin(&self, key: &[u8; 32]) -> bool;
    fn is_operator(&self, key: &[u8; 32]) -> bool;
    fn is_alerter(&self, key: &[u8; 32]) -> bool;
    fn is_reserve(&self, key: &[u8; 32]) -> bool;
}

#[inline]
pub(crate) fn require(granted: bool) -> Result<()> {
    if granted {
        Ok(())
    } else {
        Err(RateError::Unauthorized)
    }
}

/// Narrows a block number to the persisted 32-bit width.
#[inline]
pub fn block_to_u32(block: u64) -> Result<u32> {
    u32::try_from(block).map_err(|_| RateError::BlockOverflow)
}

// ============================================================================
// Engine state
// ============================================================================

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ConversionRates {
    /// Quotes older than this many blocks since their bucket update are zero
    pub valid_rate_duration_in_blocks: u64,

    /// Occupied entries of `tokens` (listed or control-info-only)
    pub num_entries: u32,

    /// Listed tokens; also the next ordinal to hand out
    pub num_listed: u32,

    /// Decimals of the quote asset on the other side of every rate
    pub quote_decimals: u8,
    pub _padding: [u8; 7],

    pub buckets: [CompactBucket; NUM_BUCKETS],
    pub tokens: [TokenData; MAX_TOKENS],
}

impl ConversionRates {
    /// Resets the engine in place. The struct is too large for the SBF stack,
    /// so it is never built by value.
    pub fn init(&mut self, valid_rate_duration_in_blocks: u64, quote_decimals: u8) -> Result<()> {
        if quote_decimals > MAX_DECIMALS {
            return Err(RateError::InvalidDecimals);
        }
        bytemuck::bytes_of_mut(self).fill(0);
        self.valid_rate_duration_in_blocks = valid_rate_duration_in_blocks;
        self.quote_decimals = quote_decimals;
        Ok(())
    }

    pub fn set_valid_rate_duration_in_blocks<A: AccessControl>(
        &mut self,
        acl: &A,
        caller: &[u8; 32],
        duration: u64,
    ) -> Result<()> {
        require(acl.is_admin(caller))?;
        self.valid_rate_duration_in_blocks = duration;
        Ok(())
    }

    pub(crate) fn find_entry(&self, token: &[u8; 32]) -> Option<usize> {
        self.tokens[..self.num_entries as usize]
            .iter()
            .position(|t| &t.mint == token)
    }

    pub(crate) fn listed_entry(&self, token: &[u8; 32]) -> Result<usize> {
        match self.find_entry(token) {
            Some(idx) if self.tokens[idx].is_listed() => Ok(idx),
            _ => Err(RateError::UnlistedToken),
        }
    }

    /// Number of buckets that hold at least one listed token.
    #[inline]
    pub fn active_buckets(&self) -> usize {
        (self.num_listed as usize + BUCKET_SIZE - 1) / BUCKET_SIZE
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_layout_has_no_padding() {
        assert_eq!(core::mem::size_of::<CompactBucket>(), 32);
        assert_eq!(core::mem::size_of::<StepFunction>(), 248);
        assert_eq!(core::mem::size_of::<ImbalanceSlot>(), 24);
        assert_eq!(core::mem::size_of::<TokenData>(), 1216);
        assert_eq!(
            core::mem::size_of::<ConversionRates>(),
            24 + 32 * NUM_BUCKETS + 1216 * MAX_TOKENS
        );
        assert_eq!(core::mem::align_of::<ConversionRates>(), 8);
    }

    #[test]
    fn test_init_rejects_wide_quote_decimals() {
        let mut rates = fresh(10);
        assert_eq!(rates.init(10, 19), Err(RateError::InvalidDecimals));
    }

    #[test]
    fn test_valid_duration_admin_only() {
        let mut rates = fresh(10);
        assert_eq!(
            rates.set_valid_rate_duration_in_blocks(&Roles, &OPERATOR, 5),
            Err(RateError::Unauthorized)
        );
        rates.set_valid_rate_duration_in_blocks(&Roles, &ADMIN, 5).unwrap();
        assert_eq!(rates.valid_rate_duration_in_blocks, 5);
    }

    #[test]
    fn test_block_narrowing() {
        assert_eq!(block_to_u32(0xffff_fffe), Ok(0xffff_fffe));
        assert_eq!(block_to_u32(0xf_ffff_fff1), Err(RateError::BlockOverflow));
    }
}
