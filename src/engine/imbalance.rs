//! Per-token imbalance ledger.
//!
//! Every token keeps a ring of SLIDING_WINDOW_SIZE slots indexed by
//! `block % SLIDING_WINDOW_SIZE`. A slot remembers the net volume of its
//! block and the running total of the rate-update epoch it was written in.
//! All values are in resolution units.

use bytemuck::{Pod, Zeroable};

use super::{
    block_to_u32, math, require, AccessControl, ConversionRates, RateError, Result,
    SLIDING_WINDOW_SIZE,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ImbalanceSlot {
    pub last_block_imbalance: i64,
    pub total_imbalance: i64,
    pub last_block: u32,
    pub last_price_update_block: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ImbalanceLedger {
    pub slots: [ImbalanceSlot; SLIDING_WINDOW_SIZE],
}

#[inline]
fn checked(a: i64, b: i64) -> Result<i64> {
    a.checked_add(b).ok_or(RateError::CastOverflow)
}

impl ImbalanceLedger {
    /// Sum of per-block volume over blocks in `[start, end]` still in the window.
    pub fn imbalance_in_range(&self, start: u32, end: u32) -> Result<i64> {
        self.slots
            .iter()
            .filter(|s| s.last_block >= start && s.last_block <= end)
            .try_fold(0i64, |acc, s| checked(acc, s.last_block_imbalance))
    }

    /// `(total since price update, volume of current block)`.
    ///
    /// The total comes from the newest slot written in the same epoch; with
    /// no such slot it is rebuilt from the per-block volumes since `price_update`.
    pub fn since_rate_update(&self, price_update: u32, current: u32) -> Result<(i64, i64)> {
        let mut latest: Option<&ImbalanceSlot> = None;
        let mut current_block = 0i64;
        for s in self.slots.iter() {
            if s.last_block == current {
                current_block = s.last_block_imbalance;
            }
            if s.last_block <= current
                && s.last_price_update_block == price_update
                && latest.map_or(true, |l| l.last_block < s.last_block)
            {
                latest = Some(s);
            }
        }
        let total = match latest {
            Some(s) => s.total_imbalance,
            None => self.imbalance_in_range(price_update, current)?,
        };
        Ok((total, current_block))
    }

    /// Adds `recorded` resolution units traded in `current` under the epoch
    /// that started at `price_update`.
    pub fn add(&mut self, recorded: i64, price_update: u32, current: u32) -> Result<()> {
        let idx = current as usize % SLIDING_WINDOW_SIZE;
        let slot = self.slots[idx];

        let next = if slot.last_block == current {
            if slot.last_price_update_block == price_update {
                ImbalanceSlot {
                    last_block_imbalance: checked(slot.last_block_imbalance, recorded)?,
                    total_imbalance: checked(slot.total_imbalance, recorded)?,
                    ..slot
                }
            } else {
                // rates were updated mid-block
                let prev = self.imbalance_in_range(price_update, current)?;
                ImbalanceSlot {
                    last_block_imbalance: checked(slot.last_block_imbalance, recorded)?,
                    total_imbalance: checked(prev, recorded)?,
                    last_block: current,
                    last_price_update_block: price_update,
                }
            }
        } else {
            let (prev, _) = self.since_rate_update(price_update, current)?;
            ImbalanceSlot {
                last_block_imbalance: recorded,
                total_imbalance: checked(prev, recorded)?,
                last_block: current,
                last_price_update_block: price_update,
            }
        };

        self.slots[idx] = next;
        Ok(())
    }
}

impl ConversionRates {
    /// Records a settled trade. `buy_amount` is the signed token volume the
    /// reserve sold (+) or bought (-). A zero `price_update_block` means the
    /// token's current rate update block.
    pub fn record_imbalance<A: AccessControl>(
        &mut self,
        acl: &A,
        caller: &[u8; 32],
        token: &[u8; 32],
        buy_amount: i128,
        price_update_block: u64,
        current_block: u64,
    ) -> Result<()> {
        require(acl.is_reserve(caller))?;
        let idx = self.listed_entry(token)?;
        let resolution = self.tokens[idx].control.minimal_record_resolution.get();
        if resolution == 0 {
            return Err(RateError::ControlInfoRequired);
        }
        let price_update_block = match price_update_block {
            0 => self.get_rate_update_block(token)?,
            b => b,
        };
        let pu = block_to_u32(price_update_block)?;
        let cur = block_to_u32(current_block)?;
        let recorded = math::to_resolution(buy_amount, resolution)?;

        self.tokens[idx].ledger.add(recorded, pu, cur)
    }

    /// `(total since price update, current block imbalance)` in resolution units.
    pub fn get_imbalance(
        &self,
        token: &[u8; 32],
        price_update_block: u64,
        current_block: u64,
    ) -> Result<(i64, i64)> {
        let idx = self.listed_entry(token)?;
        let pu = block_to_u32(price_update_block)?;
        let cur = block_to_u32(current_block)?;
        self.tokens[idx].ledger.since_rate_update(pu, cur)
    }
}
