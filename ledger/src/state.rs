//! Ledger state: everything derived from applying the chain, plus the
//! node-local peer set and identity that are persisted alongside it.

use std::collections::{BTreeMap, BTreeSet};

use rota_types::{Address, Amount, ContractState, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractMetadata {
    pub creator: Address,
    /// Timestamp of the deploying transaction.
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub code: String,
    pub state: ContractState,
    pub metadata: ContractMetadata,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerState {
    balances: BTreeMap<Address, Amount>,
    nonces: BTreeMap<Address, u64>,
    /// Keyed by the hex hash of the deploying transaction.
    contracts: BTreeMap<Address, ContractRecord>,
    peers: BTreeSet<String>,
    node_id: Option<String>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        balances: BTreeMap<Address, Amount>,
        nonces: BTreeMap<Address, u64>,
        contracts: BTreeMap<Address, ContractRecord>,
        peers: BTreeSet<String>,
        node_id: Option<String>,
    ) -> Self {
        Self {
            balances,
            nonces,
            contracts,
            peers,
            node_id,
        }
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.balances.get(address).copied().unwrap_or_default()
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    pub fn contract(&self, address: &Address) -> Option<&ContractRecord> {
        self.contracts.get(address)
    }

    pub fn balances(&self) -> &BTreeMap<Address, Amount> {
        &self.balances
    }

    pub fn nonces(&self) -> &BTreeMap<Address, u64> {
        &self.nonces
    }

    pub fn contracts(&self) -> &BTreeMap<Address, ContractRecord> {
        &self.contracts
    }

    pub fn peers(&self) -> &BTreeSet<String> {
        &self.peers
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub(crate) fn set_balance(&mut self, address: &Address, amount: Amount) {
        self.balances.insert(address.clone(), amount);
    }

    pub(crate) fn set_nonce(&mut self, address: &Address, nonce: u64) {
        self.nonces.insert(address.clone(), nonce);
    }

    pub(crate) fn put_contract(&mut self, address: Address, record: ContractRecord) {
        self.contracts.insert(address, record);
    }

    pub(crate) fn set_contract_state(&mut self, address: &Address, state: ContractState) {
        if let Some(record) = self.contracts.get_mut(address) {
            record.state = state;
        }
    }

    /// Returns `true` if the address was not known yet.
    pub fn add_peer(&mut self, addr: impl Into<String>) -> bool {
        self.peers.insert(addr.into())
    }

    pub fn set_node_id(&mut self, node_id: impl Into<String>) {
        self.node_id = Some(node_id.into());
    }

    /// Empty ledger that keeps this node's peers and identity.
    pub fn cleared(&self) -> Self {
        Self {
            peers: self.peers.clone(),
            node_id: self.node_id.clone(),
            ..Self::default()
        }
    }

    /// Total of all balances. Burned fees make this lag total minted rewards.
    pub fn total_supply(&self) -> Amount {
        self.balances.values().copied().sum()
    }
}
