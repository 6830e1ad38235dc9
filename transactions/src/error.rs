use rota_types::TxHash;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("invalid signature on transaction {tx_hash}")]
    InvalidSignature { tx_hash: TxHash },

    #[error("transaction {tx_hash} is not signed")]
    MissingSignature { tx_hash: TxHash },

    #[error("stored hash {stored} does not match computed {computed}")]
    HashMismatch { stored: TxHash, computed: TxHash },

    #[error("sender {0} is not a valid account address")]
    InvalidSender(String),

    #[error("signing key does not belong to sender {0}")]
    WrongSigner(String),

    #[error("only REWARD transactions may originate from SYSTEM")]
    SystemSender,

    #[error("REWARD transactions must originate from SYSTEM")]
    RewardNotFromSystem,

    #[error("SYSTEM transactions carry no signature")]
    SignedSystemTransaction,

    #[error("CONTRACT_DEPLOY requires code")]
    MissingCode,

    #[error("CONTRACT_CALL requires input")]
    MissingInput,
}
