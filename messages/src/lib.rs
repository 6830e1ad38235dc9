//! Network message types for ROTA node-to-node communication.
//!
//! Every message travels as a `{ "type": ..., "data": ... }` envelope. The
//! `type` tag is the SCREAMING_SNAKE_CASE variant name; request messages
//! without a payload omit `data`.

use rota_ledger::Block;
use rota_transactions::Transaction;
use rota_types::{Address, BlockHash};
use serde::{Deserialize, Serialize};

/// Handshake payload, sent by both sides right after connecting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Random per-node identifier, used to detect self-connections.
    pub node_id: String,
    /// Address other nodes should dial to reach the sender, if it has one.
    #[serde(default)]
    pub public_addr: Option<String>,
    /// Chain length, genesis included.
    pub height: u64,
    pub last_hash: BlockHash,
}

/// All messages in the protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    // Handshake
    Status(Status),

    // Sync
    /// Ask for the sender's chain starting at block index `from`.
    RequestChain { from: u64 },
    /// One page of the sender's chain: `blocks` start at index `from`, and
    /// `height` is the sender's full chain length.
    Chain { from: u64, height: u64, blocks: Vec<Block> },
    RequestBlock { index: u64 },
    BlockResponse { block: Option<Block> },
    GetMempool,
    Mempool { txs: Vec<Transaction> },

    // Gossip
    Transaction { tx: Transaction },
    Block { block: Block },
    Announce { address: Address },
    Peers { addrs: Vec<String> },
}

impl Message {
    /// Wire tag, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Status(_) => "STATUS",
            Message::RequestChain { .. } => "REQUEST_CHAIN",
            Message::Chain { .. } => "CHAIN",
            Message::RequestBlock { .. } => "REQUEST_BLOCK",
            Message::BlockResponse { .. } => "BLOCK_RESPONSE",
            Message::GetMempool => "GET_MEMPOOL",
            Message::Mempool { .. } => "MEMPOOL",
            Message::Transaction { .. } => "TRANSACTION",
            Message::Block { .. } => "BLOCK",
            Message::Announce { .. } => "ANNOUNCE",
            Message::Peers { .. } => "PEERS",
        }
    }

    /// Gossip messages are relayed to other peers and suppressed while syncing.
    pub fn is_gossip(&self) -> bool {
        matches!(self, Message::Transaction { .. } | Message::Block { .. })
    }
}
