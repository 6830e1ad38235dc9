//! Nullable store: thread-safe in-memory snapshot storage for testing.

use rota_store::{SnapshotStore, StoreError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// An in-memory [`SnapshotStore`].
///
/// `fail_saves(n)` makes the next `n` saves fail, to exercise retry and
/// durability handling.
#[derive(Default)]
pub struct NullStore {
    snapshot: Mutex<Option<Vec<u8>>>,
    failing_saves: AtomicUsize,
    save_count: AtomicUsize,
    closed: AtomicBool,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store, as if a previous run had saved `snapshot`.
    pub fn with_snapshot(snapshot: Vec<u8>) -> Self {
        let store = Self::new();
        *store.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot);
        store
    }

    pub fn fail_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for NullStore {
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(self.snapshot())
    }

    fn save(&self, snapshot: &[u8]) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let injected = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Backend("injected save failure".into()));
        }
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.to_vec());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
