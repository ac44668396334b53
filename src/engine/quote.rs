//! Rate quotes.
//!
//! A quote is built in four passes over the running rate:
//! compact delta, quantity step, imbalance caps, imbalance step.
//! Unlisted, disabled or unconfigured tokens, stale buckets and cap
//! breaches all quote zero. Arithmetic failures are errors.

use super::{
    compact, math, ConversionRates, RateError, Result, COMPACT_BPS_MULTIPLIER, MAX_QTY,
};

impl ConversionRates {
    /// Rate for a source quantity. Buy is quote asset -> token, sell is
    /// token -> quote asset.
    pub fn get_rate(&self, token: &[u8; 32], current_block: u64, is_buy: bool, qty: u128) -> Result<u128> {
        self.fetch_rate(token, current_block, is_buy, qty, true)
    }

    /// Rate for `qty` given either as the source (`is_src_qty`) or the
    /// destination amount of the trade.
    pub fn fetch_rate(
        &self,
        token: &[u8; 32],
        current_block: u64,
        is_buy: bool,
        qty: u128,
        is_src_qty: bool,
    ) -> Result<u128> {
        let Some(idx) = self.find_entry(token) else {
            return Ok(0);
        };
        let t = &self.tokens[idx];
        if !t.is_listed() || !t.is_enabled() || !t.has_control_info() {
            return Ok(0);
        }
        if qty > MAX_QTY {
            return Err(RateError::InvalidQuantity);
        }

        let (bucket, offset) = compact::position(t.ordinal);
        let b = &self.buckets[bucket];
        let update_block = b.block as u64;
        if current_block.saturating_sub(update_block) > self.valid_rate_duration_in_blocks {
            return Ok(0);
        }

        let (base, delta) = if is_buy {
            (t.base_buy_rate.get(), b.buy[offset])
        } else {
            (t.base_sell_rate.get(), b.sell[offset])
        };
        let mut rate = math::add_bps(base, delta as i64 * COMPACT_BPS_MULTIPLIER)?;
        if rate == 0 {
            return Ok(0);
        }

        let token_qty = match (is_buy, is_src_qty) {
            (true, true) => math::calc_dst_qty(qty, self.quote_decimals, t.decimals, rate)?,
            (false, false) => math::calc_src_qty(qty, t.decimals, self.quote_decimals, rate)?,
            _ => qty,
        };
        let token_qty = i128::try_from(token_qty).map_err(|_| RateError::Overflow)?;

        let qty_step = if is_buy { &t.qty_buy } else { &t.qty_sell };
        rate = math::add_bps(rate, qty_step.lookup(token_qty))?;

        // trades wider than i64 in resolution units only ever breach the caps
        let resolution = i128::try_from(t.control.minimal_record_resolution.get())
            .map_err(|_| RateError::Overflow)?;
        let trade = token_qty / resolution;
        let trade = if is_buy { trade } else { -trade };

        let (total, last_block) = self.get_imbalance(token, update_block, current_block)?;
        let projected_block = (last_block as i128).saturating_add(trade);
        let projected_total = (total as i128).saturating_add(trade);
        if projected_block.unsigned_abs() > t.control.max_per_block_imbalance.unsigned_abs() as u128
            || projected_total.unsigned_abs() > t.control.max_total_imbalance.unsigned_abs() as u128
        {
            return Ok(0);
        }

        let imbalance_qty = projected_total
            .checked_mul(resolution)
            .ok_or(RateError::Overflow)?;
        let imbalance_step = if is_buy { &t.imbalance_buy } else { &t.imbalance_sell };
        math::add_bps(rate, imbalance_step.lookup(imbalance_qty))
    }
}
