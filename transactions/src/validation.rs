//! Stateless transaction checks.
//!
//! Nonce, balance and fee checks need ledger state and live in the ledger
//! crate; everything here can be decided from the transaction alone.

use crate::error::TransactionError;
use crate::{Transaction, TxKind};
use rota_types::TxHash;

/// Kind/sender pairing and per-kind required fields.
pub fn validate_structure(tx: &Transaction) -> Result<(), TransactionError> {
    match (tx.kind, tx.is_system()) {
        (TxKind::Reward, false) => return Err(TransactionError::RewardNotFromSystem),
        (TxKind::Reward, true) => {
            if tx.signature.is_some() {
                return Err(TransactionError::SignedSystemTransaction);
            }
        }
        (_, true) => return Err(TransactionError::SystemSender),
        (_, false) => {}
    }

    match tx.kind {
        TxKind::ContractDeploy if tx.code.is_none() => Err(TransactionError::MissingCode),
        TxKind::ContractCall if tx.input.is_none() => Err(TransactionError::MissingInput),
        _ => Ok(()),
    }
}

/// Check the sender's signature over `hash`. `SYSTEM` is pre-authorized.
pub fn verify_signature(tx: &Transaction, hash: &TxHash) -> Result<(), TransactionError> {
    if tx.is_system() {
        return Ok(());
    }
    let signature = tx
        .signature
        .as_ref()
        .ok_or(TransactionError::MissingSignature { tx_hash: *hash })?;
    let public = rota_crypto::public_from_address(&tx.from)
        .ok_or_else(|| TransactionError::InvalidSender(tx.from.to_string()))?;
    if rota_crypto::verify_signature(hash.as_bytes(), signature, &public) {
        Ok(())
    } else {
        Err(TransactionError::InvalidSignature { tx_hash: *hash })
    }
}
