//! Token table: listing, control info, trade switches and base rates.

use alloc::vec::Vec;
use bytemuck::{Pod, Zeroable};

use super::{
    require, AccessControl, ConversionRates, ImbalanceLedger, RateError, Result, StepFunction,
    BUCKET_SIZE, MAX_DECIMALS, MAX_TOKENS, U128,
};

/// Imbalance controls. Caps are stored in resolution units.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TokenControlInfo {
    pub minimal_record_resolution: U128,
    pub max_per_block_imbalance: i64,
    pub max_total_imbalance: i64,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct TokenData {
    pub mint: [u8; 32],
    pub base_buy_rate: U128,
    pub base_sell_rate: U128,
    pub control: TokenControlInfo,
    pub qty_buy: StepFunction,
    pub qty_sell: StepFunction,
    pub imbalance_buy: StepFunction,
    pub imbalance_sell: StepFunction,
    pub ledger: ImbalanceLedger,
    pub listed: u8,
    pub enabled: u8,
    pub decimals: u8,
    pub _padding: u8,
    /// Listing order, fixes the compact bucket slot
    pub ordinal: u32,
}

impl TokenData {
    #[inline]
    pub fn is_listed(&self) -> bool {
        self.listed != 0
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }

    #[inline]
    pub fn has_control_info(&self) -> bool {
        !self.control.minimal_record_resolution.is_zero()
    }
}

fn cap_in_resolution(cap: u128, resolution: u128) -> Result<i64> {
    i64::try_from(cap / resolution).map_err(|_| RateError::Overflow)
}

impl ConversionRates {
    fn entry_or_alloc(&mut self, token: &[u8; 32]) -> Result<usize> {
        if let Some(idx) = self.find_entry(token) {
            return Ok(idx);
        }
        let idx = self.num_entries as usize;
        if idx >= MAX_TOKENS {
            return Err(RateError::TokenTableFull);
        }
        self.tokens[idx] = TokenData::zeroed();
        self.tokens[idx].mint = *token;
        self.num_entries += 1;
        Ok(idx)
    }

    pub fn add_token<A: AccessControl>(
        &mut self,
        acl: &A,
        caller: &[u8; 32],
        token: &[u8; 32],
        decimals: u8,
    ) -> Result<()> {
        require(acl.is_admin(caller))?;
        if let Some(idx) = self.find_entry(token) {
            if self.tokens[idx].is_listed() {
                return Err(RateError::AlreadyListed);
            }
        }
        if decimals > MAX_DECIMALS {
            return Err(RateError::InvalidDecimals);
        }
        let idx = self.entry_or_alloc(token)?;
        let ordinal = self.num_listed;

        let t = &mut self.tokens[idx];
        t.listed = 1;
        t.decimals = decimals;
        t.ordinal = ordinal;
        t.qty_buy = StepFunction::flat();
        t.qty_sell = StepFunction::flat();
        t.imbalance_buy = StepFunction::flat();
        t.imbalance_sell = StepFunction::flat();
        self.num_listed += 1;
        Ok(())
    }

    /// Sets resolution and caps. Caps arrive in token units and are stored
    /// divided by the resolution. The token need not be listed yet.
    pub fn set_token_control_info<A: AccessControl>(
        &mut self,
        acl: &A,
        caller: &[u8; 32],
        token: &[u8; 32],
        minimal_record_resolution: u128,
        max_per_block_imbalance: u128,
        max_total_imbalance: u128,
    ) -> Result<()> {
        require(acl.is_admin(caller))?;
        if minimal_record_resolution == 0 || max_per_block_imbalance == 0 || max_total_imbalance == 0 {
            return Err(RateError::ZeroParameter);
        }
        // imbalance math divides signed volumes by the resolution
        if i128::try_from(minimal_record_resolution).is_err() {
            return Err(RateError::Overflow);
        }
        let control = TokenControlInfo {
            minimal_record_resolution: U128::new(minimal_record_resolution),
            max_per_block_imbalance: cap_in_resolution(max_per_block_imbalance, minimal_record_resolution)?,
            max_total_imbalance: cap_in_resolution(max_total_imbalance, minimal_record_resolution)?,
        };
        let idx = self.entry_or_alloc(token)?;
        self.tokens[idx].control = control;
        Ok(())
    }

    pub fn enable_token_trade<A: AccessControl>(
        &mut self,
        acl: &A,
        caller: &[u8; 32],
        token: &[u8; 32],
    ) -> Result<()> {
        require(acl.is_admin(caller))?;
        let idx = self.listed_entry(token).map_err(|_| RateError::NotListed)?;
        if !self.tokens[idx].has_control_info() {
            return Err(RateError::ControlInfoRequired);
        }
        self.tokens[idx].enabled = 1;
        Ok(())
    }

    pub fn disable_token_trade<A: AccessControl>(
        &mut self,
        acl: &A,
        caller: &[u8; 32],
        token: &[u8; 32],
    ) -> Result<()> {
        require(acl.is_alerter(caller))?;
        let idx = self.listed_entry(token)?;
        self.tokens[idx].enabled = 0;
        Ok(())
    }

    /// Overwrites base rates of listed tokens and writes compact buckets in
    /// one step. Nothing is written unless every input checks out.
    #[allow(clippy::too_many_arguments)]
    pub fn set_base_rate<A: AccessControl>(
        &mut self,
        acl: &A,
        caller: &[u8; 32],
        tokens: &[[u8; 32]],
        buys: &[u128],
        sells: &[u128],
        compact_buys: &[[i8; BUCKET_SIZE]],
        compact_sells: &[[i8; BUCKET_SIZE]],
        block: u64,
        indices: &[u32],
    ) -> Result<()> {
        require(acl.is_operator(caller))?;
        if tokens.len() != buys.len() || tokens.len() != sells.len() {
            return Err(RateError::LengthMismatch);
        }
        let block = self.validate_compact(compact_buys, compact_sells, block, indices)?;

        let entries = tokens
            .iter()
            .map(|t| self.listed_entry(t))
            .collect::<Result<Vec<usize>>>()?;

        for ((&idx, &buy), &sell) in entries.iter().zip(buys).zip(sells) {
            self.tokens[idx].base_buy_rate = U128::new(buy);
            self.tokens[idx].base_sell_rate = U128::new(sell);
        }
        self.apply_compact(compact_buys, compact_sells, block, indices);
        Ok(())
    }

    pub fn get_basic_rate(&self, token: &[u8; 32], is_buy: bool) -> Result<u128> {
        let t = &self.tokens[self.listed_entry(token)?];
        Ok(if is_buy {
            t.base_buy_rate.get()
        } else {
            t.base_sell_rate.get()
        })
    }

    /// Zeroed info for tokens never configured.
    pub fn get_token_control_info(&self, token: &[u8; 32]) -> TokenControlInfo {
        self.find_entry(token)
            .map(|idx| self.tokens[idx].control)
            .unwrap_or_default()
    }

    /// `(listed, enabled)`.
    pub fn get_token_basic_data(&self, token: &[u8; 32]) -> (bool, bool) {
        self.find_entry(token)
            .map(|idx| (self.tokens[idx].is_listed(), self.tokens[idx].is_enabled()))
            .unwrap_or((false, false))
    }

    /// Listed mints in listing order.
    pub fn get_listed_tokens(&self) -> Vec<[u8; 32]> {
        let mut listed: Vec<&TokenData> = self.tokens[..self.num_entries as usize]
            .iter()
            .filter(|t| t.is_listed())
            .collect();
        listed.sort_by_key(|t| t.ordinal);
        listed.into_iter().map(|t| t.mint).collect()
    }
}
