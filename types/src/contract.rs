//! Values exchanged between the ledger and the contract execution engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persistent key/value storage of one contract.
///
/// A `BTreeMap` keeps serialization (and therefore hashing and snapshots)
/// independent of insertion order.
pub type ContractState = BTreeMap<String, serde_json::Value>;

/// Call payload carried by `CONTRACT_CALL` (and optionally `CONTRACT_DEPLOY`)
/// transactions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractInput {
    pub method: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl ContractInput {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}
