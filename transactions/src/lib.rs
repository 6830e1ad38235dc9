//! Ledger transactions.
//!
//! Every state change on the ledger is carried by a [`Transaction`]. Its kind
//! decides what applying it does:
//! - **Transfer**: move `amount` from sender to recipient
//! - **Stake**: debit `amount + fee` from the sender without crediting anyone
//! - **ContractDeploy**: run `code` on empty storage and register the contract under the tx hash
//! - **ContractCall**: run the contract at `to` with `input`, forwarding `amount`
//! - **Reward**: block subsidy plus fee share, minted by `SYSTEM` for the block's validator
//!
//! The hash is a Blake2b-256 digest over the canonical field set (everything
//! except `signature` and `hash`). Senders sign the raw digest bytes.

pub mod error;
pub mod validation;

pub use error::TransactionError;
pub use validation::{validate_structure, verify_signature};

use rota_types::{Address, Amount, ContractInput, KeyPair, Signature, Timestamp, TxHash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a transaction does when applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    Transfer,
    Stake,
    ContractDeploy,
    ContractCall,
    Reward,
}

impl TxKind {
    /// Whether applying this kind credits `to` with `amount`.
    pub fn credits_recipient(&self) -> bool {
        matches!(self, Self::Transfer | Self::ContractCall | Self::Reward)
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transfer => "TRANSFER",
            Self::Stake => "STAKE",
            Self::ContractDeploy => "CONTRACT_DEPLOY",
            Self::ContractCall => "CONTRACT_CALL",
            Self::Reward => "REWARD",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    pub nonce: u64,
    #[serde(default)]
    pub fee: Amount,
    #[serde(rename = "type")]
    pub kind: TxKind,
    /// Contract program (JSON text), deploys only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ContractInput>,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    /// All-zero until sealed. Peers may omit it; admission fills it in.
    #[serde(default)]
    pub hash: TxHash,
}

/// The hashed subset of a transaction, in a fixed field order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalTx<'a> {
    from: &'a Address,
    to: &'a Address,
    amount: &'a Amount,
    nonce: u64,
    fee: &'a Amount,
    #[serde(rename = "type")]
    kind: TxKind,
    code: &'a Option<String>,
    input: &'a Option<ContractInput>,
    timestamp: Timestamp,
}

impl Transaction {
    /// Unsigned, unsealed transaction. Chain [`with_code`](Self::with_code) /
    /// [`with_input`](Self::with_input) as needed, then [`sign`](Self::sign).
    pub fn new(
        kind: TxKind,
        from: Address,
        to: Address,
        amount: Amount,
        nonce: u64,
        fee: Amount,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            from,
            to,
            amount,
            nonce,
            fee,
            kind,
            code: None,
            input: None,
            timestamp,
            signature: None,
            hash: TxHash::ZERO,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_input(mut self, input: ContractInput) -> Self {
        self.input = Some(input);
        self
    }

    /// Sealed reward transaction minted by `SYSTEM`.
    pub fn reward(to: Address, amount: Amount, timestamp: Timestamp) -> Self {
        let mut tx = Self::new(
            TxKind::Reward,
            Address::system(),
            to,
            amount,
            0,
            Amount::ZERO,
            timestamp,
        );
        tx.seal();
        tx
    }

    pub fn is_system(&self) -> bool {
        self.from.is_system()
    }

    /// Digest over the canonical field set.
    pub fn compute_hash(&self) -> TxHash {
        let canonical = CanonicalTx {
            from: &self.from,
            to: &self.to,
            amount: &self.amount,
            nonce: self.nonce,
            fee: &self.fee,
            kind: self.kind,
            code: &self.code,
            input: &self.input,
            timestamp: self.timestamp,
        };
        let bytes = serde_json::to_vec(&canonical).expect("transaction serialization should not fail");
        rota_crypto::hash_transaction(&bytes)
    }

    /// Recompute and store the hash.
    pub fn seal(&mut self) -> TxHash {
        self.hash = self.compute_hash();
        self.hash
    }

    /// Seal and sign with the sender's key pair.
    ///
    /// Fails if `keypair` does not own `from`.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), TransactionError> {
        if rota_crypto::address_from_public(&keypair.public) != self.from {
            return Err(TransactionError::WrongSigner(self.from.to_string()));
        }
        let hash = self.seal();
        self.signature = Some(rota_crypto::sign_message(hash.as_bytes(), &keypair.private));
        Ok(())
    }

    /// Structural rules plus signature check. Returns the recomputed hash.
    pub fn verify(&self) -> Result<TxHash, TransactionError> {
        validate_structure(self)?;
        let hash = self.compute_hash();
        if !self.hash.is_zero() && self.hash != hash {
            return Err(TransactionError::HashMismatch {
                stored: self.hash,
                computed: hash,
            });
        }
        verify_signature(self, &hash)?;
        Ok(hash)
    }

    /// `amount + fee`, or `None` on overflow.
    pub fn cost(&self) -> Option<Amount> {
        self.amount.checked_add(self.fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rota_crypto::{address_from_public, keypair_from_seed};

    fn transfer(seed: u8, nonce: u64) -> (Transaction, KeyPair) {
        let kp = keypair_from_seed(&[seed; 32]);
        let tx = Transaction::new(
            TxKind::Transfer,
            address_from_public(&kp.public),
            Address::new("bob"),
            Amount::new(100),
            nonce,
            Amount::new(1),
            Timestamp::from_millis(1_700_000_000_000),
        );
        (tx, kp)
    }

    #[test]
    fn signed_transfer_verifies() {
        let (mut tx, kp) = transfer(1, 0);
        tx.sign(&kp).unwrap();
        assert_eq!(tx.verify().unwrap(), tx.hash);
    }

    #[test]
    fn hash_ignores_signature() {
        let (mut tx, kp) = transfer(1, 0);
        let before = tx.compute_hash();
        tx.sign(&kp).unwrap();
        assert_eq!(tx.compute_hash(), before);
    }

    #[test]
    fn tampered_amount_fails() {
        let (mut tx, kp) = transfer(1, 0);
        tx.sign(&kp).unwrap();
        tx.amount = Amount::new(1_000_000);
        assert!(matches!(
            tx.verify(),
            Err(TransactionError::HashMismatch { .. })
        ));
        // Without a stored hash the signature itself no longer matches.
        tx.hash = TxHash::ZERO;
        assert!(matches!(
            tx.verify(),
            Err(TransactionError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn signing_with_foreign_key_is_refused() {
        let (mut tx, _) = transfer(1, 0);
        let other = keypair_from_seed(&[2; 32]);
        assert!(matches!(tx.sign(&other), Err(TransactionError::WrongSigner(_))));
    }

    #[test]
    fn unsigned_transfer_is_rejected() {
        let (mut tx, _) = transfer(1, 0);
        tx.seal();
        assert!(matches!(
            tx.verify(),
            Err(TransactionError::MissingSignature { .. })
        ));
    }

    #[test]
    fn reward_from_system_verifies_unsigned() {
        let tx = Transaction::reward(Address::new("validator"), Amount::new(2000), Timestamp::from_millis(5));
        assert!(tx.is_system());
        assert!(tx.verify().is_ok());
    }

    #[test]
    fn wire_format_uses_type_and_string_amounts() {
        let (mut tx, kp) = transfer(3, 4);
        tx.sign(&kp).unwrap();
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "TRANSFER");
        assert_eq!(json["amount"], "100");
        assert_eq!(json["nonce"], 4);
        assert!(json.get("code").is_none());
        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn missing_hash_field_defaults_to_zero() {
        let (mut tx, kp) = transfer(3, 0);
        tx.sign(&kp).unwrap();
        let mut json = serde_json::to_value(&tx).unwrap();
        json.as_object_mut().unwrap().remove("hash");
        let back: Transaction = serde_json::from_value(json).unwrap();
        assert!(back.hash.is_zero());
        assert_eq!(back.verify().unwrap(), tx.hash);
    }
}
