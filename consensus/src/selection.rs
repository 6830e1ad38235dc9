//! Deterministic block-producer selection.

use rota_types::{Address, BlockHash};

/// Pick `candidates[seed mod |candidates|]` after sorting byte-lexicographically.
///
/// Duplicates are collapsed first. An empty candidate set yields the
/// `GENESIS` sentinel, which no real account can sign as.
pub fn select_from(mut candidates: Vec<Address>, seed: &BlockHash) -> Address {
    candidates.sort();
    candidates.dedup();
    if candidates.is_empty() {
        return Address::genesis();
    }
    let index = seed.reduce_mod(candidates.len());
    candidates.swap_remove(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(low: u8) -> BlockHash {
        let mut bytes = [0u8; 32];
        bytes[31] = low;
        BlockHash::new(bytes)
    }

    #[test]
    fn empty_set_yields_genesis() {
        assert_eq!(select_from(vec![], &seed(7)), Address::genesis());
    }

    #[test]
    fn indexes_sorted_set_by_seed() {
        let set = vec![Address::new("cc"), Address::new("aa"), Address::new("bb")];
        assert_eq!(select_from(set.clone(), &seed(0)), Address::new("aa"));
        assert_eq!(select_from(set.clone(), &seed(1)), Address::new("bb"));
        assert_eq!(select_from(set.clone(), &seed(5)), Address::new("cc"));
    }

    #[test]
    fn input_order_is_irrelevant() {
        let a = vec![Address::new("x1"), Address::new("x2"), Address::new("x3")];
        let mut b = a.clone();
        b.reverse();
        let s = BlockHash::new([0x5a; 32]);
        assert_eq!(select_from(a, &s), select_from(b, &s));
    }
}
