//! Pending transactions, highest fee first.

use std::collections::HashSet;

use rota_transactions::Transaction;
use rota_types::{Address, TxHash};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Unique-by-hash pool ordered by descending fee, FIFO among equal fees.
///
/// Entries are expected to be sealed (`hash` set).
#[derive(Clone, Debug, Default)]
pub struct Mempool {
    /// Always sorted.
    entries: Vec<Transaction>,
    hashes: HashSet<TxHash>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tx: Transaction) -> InsertOutcome {
        if !self.hashes.insert(tx.hash) {
            return InsertOutcome::AlreadyPresent;
        }
        // Insert after every entry with fee >= tx.fee to keep equal fees FIFO.
        let pos = self.entries.partition_point(|e| e.fee >= tx.fee);
        self.entries.insert(pos, tx);
        InsertOutcome::Inserted
    }

    /// Remove every listed hash; unknown hashes are ignored. Returns how many
    /// entries were dropped.
    pub fn remove<'a>(&mut self, hashes: impl IntoIterator<Item = &'a TxHash>) -> usize {
        let doomed: HashSet<TxHash> = hashes
            .into_iter()
            .filter(|h| self.hashes.contains(*h))
            .copied()
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        self.entries.retain(|tx| !doomed.contains(&tx.hash));
        for hash in &doomed {
            self.hashes.remove(hash);
        }
        doomed.len()
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.hashes.contains(hash)
    }

    pub fn filter_by_sender<'a>(&'a self, sender: &'a Address) -> impl Iterator<Item = &'a Transaction> {
        self.entries.iter().filter(move |tx| &tx.from == sender)
    }

    /// Snapshot in priority order.
    pub fn sorted(&self) -> Vec<Transaction> {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hashes.clear();
    }
}
