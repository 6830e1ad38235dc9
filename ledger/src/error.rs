use rota_store::StoreError;
use rota_transactions::TransactionError;
use rota_types::{Address, Amount, BlockHash};
use thiserror::Error;

/// Why a transaction could not be applied to a state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error(transparent)]
    Invalid(#[from] TransactionError),

    #[error("nonce {got} does not match expected {expected}")]
    BadNonce { expected: u64, got: u64 },

    #[error("insufficient balance: need {need}, have {available}")]
    InsufficientBalance { need: Amount, available: Amount },

    #[error("no contract at {0}")]
    MissingContract(Address),

    #[error("balance overflow crediting {0}")]
    Overflow(Address),
}

/// Why a transaction was refused entry to the mempool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("REWARD transactions are minted by block producers only")]
    RewardNotAdmissible,

    #[error(transparent)]
    Invalid(#[from] TransactionError),

    #[error("nonce {got} does not follow pending nonce {expected}")]
    NonceGap { expected: u64, got: u64 },

    #[error("fee {got} below minimum {min}")]
    FeeTooLow { min: Amount, got: Amount },

    #[error("insufficient pending balance: need {need}, have {available}")]
    InsufficientBalance { need: Amount, available: Amount },
}

/// Why a block (or a replacement chain) was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("block index {got}, expected {expected}")]
    IndexMismatch { expected: u64, got: u64 },

    #[error("block links to {got}, tip is {expected}")]
    LinkMismatch { expected: BlockHash, got: BlockHash },

    #[error("stored block hash {stored} does not match computed {computed}")]
    HashMismatch { stored: BlockHash, computed: BlockHash },

    #[error("block produced by {got}, slot belongs to {expected}")]
    WrongValidator { expected: Address, got: Address },

    #[error("transaction {position} in block rejected: {source}")]
    InvalidTransaction {
        position: usize,
        #[source]
        source: ApplyError,
    },

    #[error("block carries more than one REWARD")]
    MultipleRewards,

    #[error("reward {got} does not match entitlement {expected}")]
    RewardMismatch { expected: Amount, got: Amount },

    #[error("reward paid to {got}, block validator is {expected}")]
    RewardRecipient { expected: Address, got: Address },

    #[error("fee total overflow")]
    FeeOverflow,

    #[error("first block is not the canonical genesis")]
    GenesisMismatch,

    #[error("empty chain")]
    EmptyChain,
}

impl ChainError {
    /// The block does not extend our tip: the peer is on another branch.
    pub fn is_fork(&self) -> bool {
        matches!(self, ChainError::LinkMismatch { .. })
    }
}

/// Failures opening or persisting the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("snapshot encoding error: {0}")]
    Snapshot(String),
}
