//! Cryptographic primitives for the rota ledger.
//!
//! - **Ed25519** for transaction signing and verification
//! - **Blake2b-256** for transaction and block digests
//! - Addresses are the lowercase hex encoding of the Ed25519 public key
//! - **BIP39** mnemonics for reproducible validator identities

pub mod address;
pub mod hash;
pub mod keys;
pub mod mnemonic;
pub mod sign;

pub use address::{address_from_public, public_from_address, validate_address};
pub use hash::{hash_block, hash_transaction};
pub use keys::{generate_keypair, keypair_from_seed};
pub use mnemonic::{generate_mnemonic, keypair_from_mnemonic, MnemonicError, DERIVATION_PATH};
pub use sign::{sign_message, verify_signature};
