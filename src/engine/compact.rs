//! Compact per-bucket rate deltas.
//!
//! Each bucket packs one signed byte per token for buy and for sell, 14
//! tokens wide, plus the block of its last write. A token's bucket and slot
//! follow from its listing ordinal.

use bytemuck::{Pod, Zeroable};

use super::{
    block_to_u32, require, AccessControl, ConversionRates, RateError, Result, BUCKET_SIZE,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CompactBucket {
    pub buy: [i8; BUCKET_SIZE],
    pub sell: [i8; BUCKET_SIZE],
    /// Block of the last write to any slot of this bucket
    pub block: u32,
}

/// Bucket index and slot of a listing ordinal.
#[inline]
pub const fn position(ordinal: u32) -> (usize, usize) {
    (ordinal as usize / BUCKET_SIZE, ordinal as usize % BUCKET_SIZE)
}

/// Result of `get_compact_data`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactData {
    pub bucket: usize,
    pub offset: usize,
    pub buy: i8,
    pub sell: i8,
}

impl ConversionRates {
    /// Checks a compact batch without touching state, returning the narrowed block.
    pub(crate) fn validate_compact(
        &self,
        buys: &[[i8; BUCKET_SIZE]],
        sells: &[[i8; BUCKET_SIZE]],
        block: u64,
        indices: &[u32],
    ) -> Result<u32> {
        if buys.len() != sells.len() || indices.len() != buys.len() {
            return Err(RateError::LengthMismatch);
        }
        let block = block_to_u32(block)?;
        let active = self.active_buckets();
        if indices.iter().any(|&i| i as usize >= active) {
            return Err(RateError::InvalidIndices);
        }
        Ok(block)
    }

    pub(crate) fn apply_compact(
        &mut self,
        buys: &[[i8; BUCKET_SIZE]],
        sells: &[[i8; BUCKET_SIZE]],
        block: u32,
        indices: &[u32],
    ) {
        for ((&i, buy), sell) in indices.iter().zip(buys).zip(sells) {
            self.buckets[i as usize] = CompactBucket {
                buy: *buy,
                sell: *sell,
                block,
            };
        }
    }

    pub fn set_compact_data<A: AccessControl>(
        &mut self,
        acl: &A,
        caller: &[u8; 32],
        buys: &[[i8; BUCKET_SIZE]],
        sells: &[[i8; BUCKET_SIZE]],
        block: u64,
        indices: &[u32],
    ) -> Result<()> {
        require(acl.is_operator(caller))?;
        let block = self.validate_compact(buys, sells, block, indices)?;
        self.apply_compact(buys, sells, block, indices);
        Ok(())
    }

    pub fn get_compact_data(&self, token: &[u8; 32]) -> Result<CompactData> {
        let t = &self.tokens[self.listed_entry(token)?];
        let (bucket, offset) = position(t.ordinal);
        let b = &self.buckets[bucket];
        Ok(CompactData {
            bucket,
            offset,
            buy: b.buy[offset],
            sell: b.sell[offset],
        })
    }

    fn bucket_block(&self, bucket: usize) -> u64 {
        self.buckets[bucket].block as u64
    }

    /// Block stored in the bucket holding `token`.
    pub fn get_update_rate_block_from_compact(&self, token: &[u8; 32]) -> Result<u64> {
        let t = &self.tokens[self.listed_entry(token)?];
        Ok(self.bucket_block(position(t.ordinal).0))
    }

    /// Last rate update block of a token, shared with its whole bucket.
    pub fn get_rate_update_block(&self, token: &[u8; 32]) -> Result<u64> {
        self.get_update_rate_block_from_compact(token)
    }
}
