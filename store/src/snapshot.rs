//! Snapshot storage trait.

use crate::StoreError;

/// Whole-ledger persistence.
///
/// `save` replaces the previous snapshot atomically: after a crash, `load`
/// returns either the old or the new bytes, never a mix.
pub trait SnapshotStore: Send + Sync {
    /// The last saved snapshot, or `None` on a fresh store.
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Overwrite the stored snapshot.
    fn save(&self, snapshot: &[u8]) -> Result<(), StoreError>;

    /// Flush and release resources. Later calls fail with [`StoreError::Closed`].
    fn close(&self) -> Result<(), StoreError>;
}
