//! Account and validator keys.
//!
//! Wallets draw fresh keys from the OS; validators and tests derive theirs
//! from a fixed 32-byte seed so the same identity comes back on every start.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rota_types::{KeyPair, PrivateKey, PublicKey};

fn to_keypair(signing_key: SigningKey) -> KeyPair {
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Fresh random key pair.
pub fn generate_keypair() -> KeyPair {
    to_keypair(SigningKey::generate(&mut OsRng))
}

/// Key pair whose Ed25519 secret is `seed` itself.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    to_keypair(SigningKey::from_bytes(seed))
}
