//! Account addresses.
//!
//! An account address is the lowercase hex encoding of its Ed25519 public
//! key (64 characters). Verifying a transaction signature therefore needs
//! nothing but the sender address.

use rota_types::{Address, PublicKey};

const ADDRESS_HEX_LEN: usize = 64;

/// Derive the address that owns `public_key`.
pub fn address_from_public(public_key: &PublicKey) -> Address {
    Address::new(hex::encode(public_key.as_bytes()))
}

/// Recover the public key behind an address.
///
/// Returns `None` for sentinels (`SYSTEM`, `GENESIS`), uppercase or
/// malformed hex, and wrong lengths.
pub fn public_from_address(address: &Address) -> Option<PublicKey> {
    let s = address.as_str();
    if s.len() != ADDRESS_HEX_LEN || s.bytes().any(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let bytes = hex::decode(s).ok()?;
    let arr: [u8; 32] = bytes.as_slice().try_into().ok()?;
    Some(PublicKey(arr))
}

/// Whether `address` is a well-formed account address.
pub fn validate_address(address: &Address) -> bool {
    public_from_address(address).is_some()
}
