//! Ledger state machine.
//!
//! A single chain of blocks, each produced by the validator whose turn it
//! was, applied in order to one owned [`LedgerState`]. [`Chain`] is the only
//! mutator: it admits transactions into the [`Mempool`], assembles blocks,
//! validates and applies incoming blocks, and replaces its history when a
//! fork is detected.
//!
//! ## Module overview
//!
//! - [`block`]: block type, digest, genesis.
//! - [`state`]: balances, nonces, contracts, peers, node identity.
//! - [`economy`]: subsidy halving schedule and fee split.
//! - [`mempool`]: fee-ordered pending transactions.
//! - [`apply`]: transaction and block application against a state.
//! - [`chain`]: the state machine tying everything together.
//! - [`snapshot`]: persisted form of the ledger.

pub mod apply;
pub mod block;
pub mod chain;
pub mod economy;
pub mod error;
pub mod mempool;
pub mod snapshot;
pub mod state;

pub use apply::{apply_block_body, apply_transaction};
pub use block::Block;
pub use chain::{AdmissionStatus, BlockReceipt, Chain, ProducedBlock, SAVE_ATTEMPTS};
pub use economy::Economy;
pub use error::{AdmissionError, ApplyError, ChainError, LedgerError};
pub use mempool::{InsertOutcome, Mempool};
pub use snapshot::LedgerSnapshot;
pub use state::{ContractMetadata, ContractRecord, LedgerState};
