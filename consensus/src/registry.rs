//! Validator heartbeat registry.

use std::collections::HashMap;

use rota_types::{Address, BlockHash, Timestamp};

use crate::selection::select_from;

/// Tracks when each validator was last heard from.
#[derive(Clone, Debug)]
pub struct ValidatorRegistry {
    /// Validator → timestamp of its most recent heartbeat.
    last_seen: HashMap<Address, Timestamp>,
    /// Heartbeats older than this no longer count.
    timeout_ms: u64,
}

impl ValidatorRegistry {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            last_seen: HashMap::new(),
            timeout_ms,
        }
    }

    /// Record a heartbeat. Never moves an entry backwards in time.
    pub fn register(&mut self, validator: Address, now: Timestamp) {
        let entry = self.last_seen.entry(validator).or_insert(now);
        if now > *entry {
            *entry = now;
        }
    }

    pub fn is_active(&self, validator: &Address, now: Timestamp) -> bool {
        self.last_seen
            .get(validator)
            .is_some_and(|seen| seen.elapsed_since(now) < self.timeout_ms)
    }

    /// Active validators, sorted.
    pub fn valid_validators(&self, now: Timestamp) -> Vec<Address> {
        let mut active: Vec<Address> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| seen.elapsed_since(now) < self.timeout_ms)
            .map(|(addr, _)| addr.clone())
            .collect();
        active.sort();
        active
    }

    /// Producer of the block following the block hashed `seed`.
    ///
    /// `must_include` joins the candidate set even when inactive; block
    /// validation passes the block's claimed validator so a producer whose
    /// heartbeat has not reached us yet can still be checked.
    pub fn select_validator(
        &self,
        seed: &BlockHash,
        must_include: Option<&Address>,
        now: Timestamp,
    ) -> Address {
        let mut candidates = self.valid_validators(now);
        if let Some(forced) = must_include {
            if !candidates.contains(forced) {
                candidates.push(forced.clone());
            }
        }
        let winner = select_from(candidates, seed);
        tracing::trace!(seed = %seed.short(), winner = %winner.short(), "selected validator");
        winner
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: u64 = 60_000;

    fn t(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn heartbeat_expires_lazily() {
        let mut reg = ValidatorRegistry::new(TIMEOUT);
        reg.register(Address::new("v1"), t(1_000));
        assert_eq!(reg.valid_validators(t(60_999)), vec![Address::new("v1")]);
        assert!(reg.valid_validators(t(61_000)).is_empty());
        // The entry itself stays.
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn refresh_revives_validator() {
        let mut reg = ValidatorRegistry::new(TIMEOUT);
        reg.register(Address::new("v1"), t(0));
        reg.register(Address::new("v1"), t(100_000));
        assert!(reg.is_active(&Address::new("v1"), t(120_000)));
    }

    #[test]
    fn stale_heartbeat_does_not_rewind() {
        let mut reg = ValidatorRegistry::new(TIMEOUT);
        reg.register(Address::new("v1"), t(100_000));
        reg.register(Address::new("v1"), t(1));
        assert!(reg.is_active(&Address::new("v1"), t(150_000)));
    }

    #[test]
    fn empty_registry_selects_genesis() {
        let reg = ValidatorRegistry::new(TIMEOUT);
        assert_eq!(
            reg.select_validator(&BlockHash::ZERO, None, t(0)),
            Address::genesis()
        );
    }

    #[test]
    fn must_include_joins_the_set() {
        let reg = ValidatorRegistry::new(TIMEOUT);
        let v = Address::new("late");
        assert_eq!(reg.select_validator(&BlockHash::ZERO, Some(&v), t(0)), v);
    }

    #[test]
    fn must_include_is_not_duplicated() {
        let mut reg = ValidatorRegistry::new(TIMEOUT);
        reg.register(Address::new("a"), t(0));
        reg.register(Address::new("b"), t(0));
        // Seed 1 picks index 1 of [a, b]; a duplicate "a" would shift it.
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let seed = BlockHash::new(bytes);
        assert_eq!(
            reg.select_validator(&seed, Some(&Address::new("a")), t(0)),
            Address::new("b")
        );
    }
}
