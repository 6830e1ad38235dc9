//! Blocks and the genesis block.
//!
//! The digest covers index, timestamp, the full transaction list, validator
//! and the previous block hash. Transactions are hashed in their complete
//! wire form (signatures included), so a block commits to exactly what its
//! producer saw.

use rota_transactions::{Transaction, TxKind};
use rota_types::{Address, BlockHash, ChainParams, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub last_hash: BlockHash,
    pub timestamp: Timestamp,
    pub transactions: Vec<Transaction>,
    pub validator: Address,
    pub hash: BlockHash,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalBlock<'a> {
    index: u64,
    timestamp: Timestamp,
    transactions: &'a [Transaction],
    validator: &'a Address,
    last_hash: &'a BlockHash,
}

impl Block {
    /// Build and seal a block.
    pub fn new(
        index: u64,
        last_hash: BlockHash,
        timestamp: Timestamp,
        transactions: Vec<Transaction>,
        validator: Address,
    ) -> Self {
        let mut block = Self {
            index,
            last_hash,
            timestamp,
            transactions,
            validator,
            hash: BlockHash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// The canonical first block: no transactions, validator `GENESIS`,
    /// all-zero `last_hash`, fixed timestamp.
    pub fn genesis(params: &ChainParams) -> Self {
        Self::new(
            0,
            BlockHash::ZERO,
            Timestamp::from_millis(params.genesis_timestamp_ms),
            Vec::new(),
            Address::genesis(),
        )
    }

    pub fn compute_hash(&self) -> BlockHash {
        let canonical = CanonicalBlock {
            index: self.index,
            timestamp: self.timestamp,
            transactions: &self.transactions,
            validator: &self.validator,
            last_hash: &self.last_hash,
        };
        let bytes = serde_json::to_vec(&canonical).expect("block serialization should not fail");
        rota_crypto::hash_block(&bytes)
    }

    /// Whether the stored hash matches the content.
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// The embedded reward transactions (a valid block carries at most one).
    pub fn rewards(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| tx.kind == TxKind::Reward)
    }
}
