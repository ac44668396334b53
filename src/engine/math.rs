//! Fixed-point helpers: bps adjustment, decimals-aware quantity conversion
//! and checked narrowing of imbalance values.

use primitive_types::U256;

use super::{
    RateError, Result, BPS, MAX_BPS_ADJUSTMENT, MAX_DECIMALS, MAX_QTY, MAX_RATE,
    MIN_BPS_ADJUSTMENT, PRECISION,
};

/// `rate * (10000 + bps) / 10000`, truncating.
pub fn add_bps(rate: u128, bps: i64) -> Result<u128> {
    if rate > MAX_RATE {
        return Err(RateError::InvalidRate);
    }
    if !(MIN_BPS_ADJUSTMENT..=MAX_BPS_ADJUSTMENT).contains(&bps) {
        return Err(RateError::BpsOutOfRange);
    }
    // rate <= 10^25 and factor <= ~10^11, product stays well inside u128
    let factor = (BPS + bps as i128) as u128;
    let scaled = rate.checked_mul(factor).ok_or(RateError::Overflow)?;
    Ok(scaled / BPS as u128)
}

fn check_conversion_inputs(qty: u128, rate: u128) -> Result<()> {
    if qty > MAX_QTY {
        return Err(RateError::InvalidQuantity);
    }
    if rate > MAX_RATE {
        return Err(RateError::InvalidRate);
    }
    Ok(())
}

fn decimals_gap(hi: u8, lo: u8) -> Result<usize> {
    let gap = hi - lo;
    if gap > MAX_DECIMALS {
        return Err(RateError::InvalidDecimals);
    }
    Ok(gap as usize)
}

fn narrow(v: U256) -> Result<u128> {
    if v.bits() > 128 {
        return Err(RateError::Overflow);
    }
    Ok(v.low_u128())
}

/// Destination amount bought by `src_qty` at `rate`, rounded down.
pub fn calc_dst_qty(src_qty: u128, src_decimals: u8, dst_decimals: u8, rate: u128) -> Result<u128> {
    check_conversion_inputs(src_qty, rate)?;
    let product = U256::from(src_qty) * U256::from(rate);
    let out = if dst_decimals >= src_decimals {
        let gap = decimals_gap(dst_decimals, src_decimals)?;
        product * U256::exp10(gap) / U256::from(PRECISION)
    } else {
        let gap = decimals_gap(src_decimals, dst_decimals)?;
        product / (U256::from(PRECISION) * U256::exp10(gap))
    };
    narrow(out)
}

/// Source amount needed to receive `dst_qty` at `rate`, rounded up.
pub fn calc_src_qty(dst_qty: u128, src_decimals: u8, dst_decimals: u8, rate: u128) -> Result<u128> {
    check_conversion_inputs(dst_qty, rate)?;
    if rate == 0 {
        return Err(RateError::InvalidRate);
    }
    let (numerator, denominator) = if src_decimals >= dst_decimals {
        let gap = decimals_gap(src_decimals, dst_decimals)?;
        (
            U256::from(PRECISION) * U256::from(dst_qty) * U256::exp10(gap),
            U256::from(rate),
        )
    } else {
        let gap = decimals_gap(dst_decimals, src_decimals)?;
        (
            U256::from(PRECISION) * U256::from(dst_qty),
            U256::from(rate) * U256::exp10(gap),
        )
    };
    narrow((numerator + denominator - U256::one()) / denominator)
}

/// Narrows an accumulated imbalance to the persisted 64-bit width.
#[inline]
pub fn to_i64(v: i128) -> Result<i64> {
    i64::try_from(v).map_err(|_| RateError::CastOverflow)
}

/// Converts a raw signed volume into resolution units, truncating toward zero.
pub fn to_resolution(qty: i128, resolution: u128) -> Result<i64> {
    let res = i128::try_from(resolution).map_err(|_| RateError::Overflow)?;
    if res == 0 {
        return Err(RateError::ZeroParameter);
    }
    to_i64(qty / res)
}
