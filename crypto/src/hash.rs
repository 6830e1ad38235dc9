//! Block and transaction digests.
//!
//! Both are Blake2b with a 32-byte output over the canonical JSON encoding
//! the caller supplies.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rota_types::{BlockHash, TxHash};

fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake2b::<U32>::digest(data));
    out
}

pub fn hash_block(canonical: &[u8]) -> BlockHash {
    BlockHash::new(blake2b_256(canonical))
}

pub fn hash_transaction(canonical: &[u8]) -> TxHash {
    TxHash::new(blake2b_256(canonical))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_reference_vector() {
        assert_eq!(
            hash_transaction(b"").to_hex(),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn block_and_transaction_digests_agree_on_bytes() {
        let bytes = br#"{"index":1,"transactions":[]}"#;
        assert_eq!(hash_block(bytes).as_bytes(), hash_transaction(bytes).as_bytes());
    }

    #[test]
    fn reordered_fields_change_the_digest() {
        let canonical = hash_transaction(br#"{"from":"a","to":"b"}"#);
        let reordered = hash_transaction(br#"{"to":"b","from":"a"}"#);
        assert_ne!(canonical, reordered);
    }
}
