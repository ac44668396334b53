//! Ceiling step functions and their per-token storage.

use bytemuck::{Pod, Zeroable};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::{require, AccessControl, ConversionRates, RateError, Result, I128, MAX_STEPS};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct StepFunction {
    pub x: [I128; MAX_STEPS],
    pub y: [i64; MAX_STEPS],
    pub len: u64,
}

impl StepFunction {
    /// Validates and builds a step function from parallel threshold/bps arrays.
    pub fn from_parts(x: &[i128], y: &[i64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(RateError::LengthMismatch);
        }
        if x.len() > MAX_STEPS {
            return Err(RateError::TooManySteps);
        }
        if x.windows(2).any(|w| w[1] < w[0]) {
            return Err(RateError::StepsNotMonotonic);
        }
        let mut f = StepFunction::zeroed();
        for (i, (&xi, &yi)) in x.iter().zip(y).enumerate() {
            f.x[i] = I128::new(xi);
            f.y[i] = yi;
        }
        f.len = x.len() as u64;
        Ok(f)
    }

    /// The single zero step every freshly listed token starts with.
    pub fn flat() -> Self {
        let mut f = StepFunction::zeroed();
        f.len = 1;
        f
    }

    #[inline]
    pub fn len(&self) -> usize {
        (self.len as usize).min(MAX_STEPS)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bps of the first step whose threshold is >= `value`, else the last
    /// step's bps. Empty functions adjust nothing.
    pub fn lookup(&self, value: i128) -> i64 {
        let n = self.len();
        if n == 0 {
            return 0;
        }
        for i in 0..n {
            if value <= self.x[i].get() {
                return self.y[i];
            }
        }
        self.y[n - 1]
    }
}

/// Selector for `get_step_function_data`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
pub enum StepCommand {
    QtyBuyXLength = 0,
    QtyBuyX = 1,
    QtyBuyYLength = 2,
    QtyBuyY = 3,
    QtySellXLength = 4,
    QtySellX = 5,
    QtySellYLength = 6,
    QtySellY = 7,
    ImbalanceBuyXLength = 8,
    ImbalanceBuyX = 9,
    ImbalanceBuyYLength = 10,
    ImbalanceBuyY = 11,
    ImbalanceSellXLength = 12,
    ImbalanceSellX = 13,
    ImbalanceSellYLength = 14,
    ImbalanceSellY = 15,
}

impl StepCommand {
    pub fn from_id(id: u8) -> Result<Self> {
        StepCommand::from_u8(id).ok_or(RateError::InvalidCommand)
    }
}

impl ConversionRates {
    #[allow(clippy::too_many_arguments)]
    pub fn set_qty_step_function<A: AccessControl>(
        &mut self,
        acl: &A,
        caller: &[u8; 32],
        token: &[u8; 32],
        x_buy: &[i128],
        y_buy: &[i64],
        x_sell: &[i128],
        y_sell: &[i64],
    ) -> Result<()> {
        require(acl.is_operator(caller))?;
        let idx = self.listed_entry(token)?;
        let buy = StepFunction::from_parts(x_buy, y_buy)?;
        let sell = StepFunction::from_parts(x_sell, y_sell)?;
        let t = &mut self.tokens[idx];
        t.qty_buy = buy;
        t.qty_sell = sell;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_imbalance_step_function<A: AccessControl>(
        &mut self,
        acl: &A,
        caller: &[u8; 32],
        token: &[u8; 32],
        x_buy: &[i128],
        y_buy: &[i64],
        x_sell: &[i128],
        y_sell: &[i64],
    ) -> Result<()> {
        require(acl.is_operator(caller))?;
        let idx = self.listed_entry(token)?;
        let buy = StepFunction::from_parts(x_buy, y_buy)?;
        let sell = StepFunction::from_parts(x_sell, y_sell)?;
        let t = &mut self.tokens[idx];
        t.imbalance_buy = buy;
        t.imbalance_sell = sell;
        Ok(())
    }

    /// Lengths and single cells of a token's four step functions.
    /// `param` is the cell index for the X/Y commands and ignored otherwise.
    pub fn get_step_function_data(&self, token: &[u8; 32], command: u8, param: u64) -> Result<i128> {
        let cmd = StepCommand::from_id(command)?;
        let t = &self.tokens[self.listed_entry(token)?];

        let f = match cmd as u8 / 4 {
            0 => &t.qty_buy,
            1 => &t.qty_sell,
            2 => &t.imbalance_buy,
            _ => &t.imbalance_sell,
        };
        let cell = || -> Result<usize> {
            let i = param as usize;
            if param > MAX_STEPS as u64 || i >= f.len() {
                return Err(RateError::InvalidIndices);
            }
            Ok(i)
        };

        match cmd as u8 % 4 {
            0 | 2 => Ok(f.len() as i128),
            1 => Ok(f.x[cell()?].get()),
            _ => Ok(f.y[cell()?] as i128),
        }
    }
}
