//! Chain parameters.
//!
//! Every node on a network must run with identical values: they feed block
//! validation (reward entitlement, validator liveness) and the genesis block.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Subsidy paid to the validator of a block at height 0, in raw units.
    #[serde(default = "default_base_reward")]
    pub base_reward: u64,

    /// Number of blocks between subsidy halvings.
    #[serde(default = "default_halving_interval")]
    pub halving_interval: u64,

    /// A validator is active while its last heartbeat is younger than this.
    #[serde(default = "default_validator_timeout_ms")]
    pub validator_timeout_ms: u64,

    /// Upper bound on mempool transactions drawn into one block.
    #[serde(default = "default_max_block_transactions")]
    pub max_block_transactions: usize,

    /// Fixed timestamp of the genesis block.
    #[serde(default = "default_genesis_timestamp_ms")]
    pub genesis_timestamp_ms: u64,
}

fn default_base_reward() -> u64 {
    2000
}

fn default_halving_interval() -> u64 {
    10_000
}

fn default_validator_timeout_ms() -> u64 {
    60_000
}

fn default_max_block_transactions() -> usize {
    50
}

fn default_genesis_timestamp_ms() -> u64 {
    1_739_530_000_000
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            base_reward: default_base_reward(),
            halving_interval: default_halving_interval(),
            validator_timeout_ms: default_validator_timeout_ms(),
            max_block_transactions: default_max_block_transactions(),
            genesis_timestamp_ms: default_genesis_timestamp_ms(),
        }
    }
}
