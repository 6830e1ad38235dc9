//! Digest signatures.
//!
//! Senders never sign a transaction's JSON. They sign the 32 raw bytes of its
//! Blake2b digest, and verifiers recompute that digest before checking.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rota_types::{PrivateKey, PublicKey, Signature};

/// Ed25519 signature over `message` (in practice a 32-byte digest).
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    let signature = SigningKey::from_bytes(&private_key.0).sign(message);
    Signature(signature.to_bytes())
}

/// Check `signature` over `message` against `public_key`. A key that is not
/// a valid curve point never verifies.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    match VerifyingKey::from_bytes(&public_key.0) {
        Ok(key) => key
            .verify(message, &ed25519_dalek::Signature::from_bytes(&signature.0))
            .is_ok(),
        Err(_) => false,
    }
}
