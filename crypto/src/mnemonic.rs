//! Validator identities from BIP39 phrases.
//!
//! A node started with `VALIDATOR_MNEMONIC` signs its blocks with the key
//! behind that phrase. The phrase's BIP39 seed (empty passphrase) is run
//! through HMAC-SHA512 keyed with [`DERIVATION_PATH`], and the first half of
//! the output is the Ed25519 secret.

use bip39::Mnemonic;
use hmac::{Hmac, Mac};
use rota_types::KeyPair;
use sha2::Sha512;
use thiserror::Error;

use crate::keypair_from_seed;

/// HMAC key for validator key derivation.
pub const DERIVATION_PATH: &str = "m/44'/7407'/0'/0/0";

#[derive(Debug, Error)]
pub enum MnemonicError {
    #[error("invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),
}

/// New 24-word phrase, as printed by `rota-daemon keygen`.
pub fn generate_mnemonic() -> Result<String, MnemonicError> {
    let mut entropy = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut entropy);
    Mnemonic::from_entropy(&entropy)
        .map(|phrase| phrase.to_string())
        .map_err(|e| MnemonicError::DerivationFailed(e.to_string()))
}

/// Validator key pair behind `phrase`.
pub fn keypair_from_mnemonic(phrase: &str) -> Result<KeyPair, MnemonicError> {
    let mnemonic = Mnemonic::parse_normalized(phrase).map_err(|e| MnemonicError::InvalidMnemonic(e.to_string()))?;

    let mut mac = HmacSha512::new_from_slice(DERIVATION_PATH.as_bytes())
        .map_err(|e| MnemonicError::DerivationFailed(e.to_string()))?;
    mac.update(&mnemonic.to_seed_normalized(""));
    let output = mac.finalize().into_bytes();

    let mut secret = [0u8; 32];
    secret.copy_from_slice(&output[..32]);
    Ok(keypair_from_seed(&secret))
}

type HmacSha512 = Hmac<Sha512>;
