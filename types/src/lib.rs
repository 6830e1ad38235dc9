//! Fundamental types for the rota ledger.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! addresses, hashes, amounts, timestamps, keys, chain parameters, and the
//! opaque value types that contracts read and write.

pub mod address;
pub mod amount;
pub mod contract;
pub mod error;
pub mod hash;
pub mod keys;
pub mod params;
pub mod time;

pub use address::Address;
pub use amount::Amount;
pub use contract::{ContractInput, ContractState};
pub use error::TypesError;
pub use hash::{BlockHash, TxHash};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use params::ChainParams;
pub use time::{Clock, SystemClock, Timestamp};
