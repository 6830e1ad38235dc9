//! Ledger snapshots: the persisted form of a node's ledger.
//!
//! One snapshot holds the full chain together with the state derived from
//! it, so a restarting node resumes without replaying history. It is written
//! as JSON after every accepted block and read once at startup.

use std::collections::{BTreeMap, BTreeSet};

use rota_types::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::error::LedgerError;
use crate::state::{ContractRecord, LedgerState};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub chain: Vec<Block>,
    #[serde(default)]
    pub balances: BTreeMap<Address, Amount>,
    #[serde(default)]
    pub nonces: BTreeMap<Address, u64>,
    #[serde(default, rename = "contractState")]
    pub contracts: BTreeMap<Address, ContractRecord>,
    #[serde(default)]
    pub peers: BTreeSet<String>,
    #[serde(default)]
    pub node_id: Option<String>,
}

impl LedgerSnapshot {
    pub fn capture(chain: &[Block], state: &LedgerState) -> Self {
        Self {
            chain: chain.to_vec(),
            balances: state.balances().clone(),
            nonces: state.nonces().clone(),
            contracts: state.contracts().clone(),
            peers: state.peers().clone(),
            node_id: state.node_id().map(str::to_string),
        }
    }

    /// Split into chain and state.
    pub fn into_parts(self) -> (Vec<Block>, LedgerState) {
        let state = LedgerState::from_parts(
            self.balances,
            self.nonces,
            self.contracts,
            self.peers,
            self.node_id,
        );
        (self.chain, state)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("snapshot serialization should not fail")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        serde_json::from_slice(bytes).map_err(|e| LedgerError::Snapshot(e.to_string()))
    }
}
