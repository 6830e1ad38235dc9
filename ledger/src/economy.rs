//! Block subsidy and fee split.

use rota_types::{Amount, ChainParams};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Economy {
    base_reward: u128,
    halving_interval: u64,
}

impl Economy {
    pub fn new(params: &ChainParams) -> Self {
        Self {
            base_reward: u128::from(params.base_reward),
            halving_interval: params.halving_interval.max(1),
        }
    }

    /// `base >> floor(height / interval)`, zero once the subsidy is exhausted.
    pub fn block_reward(&self, height: u64) -> Amount {
        let halvings = height / self.halving_interval;
        if halvings >= u128::BITS as u64 {
            return Amount::ZERO;
        }
        Amount::new(self.base_reward >> halvings)
    }

    /// The validator's share of collected fees; the rest is burned.
    pub fn fee_split(&self, total_fees: Amount) -> Amount {
        Amount::new(total_fees.raw() / 2)
    }

    /// Full entitlement of the producer of block `height`.
    pub fn entitlement(&self, height: u64, total_fees: Amount) -> Amount {
        self.block_reward(height)
            .saturating_add(self.fee_split(total_fees))
    }
}

impl Default for Economy {
    fn default() -> Self {
        Self::new(&ChainParams::default())
    }
}
