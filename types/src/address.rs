//! Account address type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An account address.
///
/// A real account address is the lowercase hex encoding of the account's
/// Ed25519 public key. Two sentinels exist: [`Address::SYSTEM`] originates
/// block rewards and [`Address::GENESIS`] validates the genesis block.
/// Ordering is byte-lexicographic, which is what validator rotation sorts by.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub const SYSTEM: &'static str = "SYSTEM";
    pub const GENESIS: &'static str = "GENESIS";

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    pub fn genesis() -> Self {
        Self(Self::GENESIS.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == Self::SYSTEM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(10);
        self.0.get(..end).unwrap_or(&self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
