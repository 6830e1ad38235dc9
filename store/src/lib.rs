//! Abstract storage for the rota ledger.
//!
//! The ledger persists itself as one opaque snapshot that is overwritten after
//! every accepted block. Backends (LMDB, in-memory for testing) implement
//! [`SnapshotStore`]; the rest of the codebase depends only on the trait.

pub mod error;
pub mod snapshot;

pub use error::StoreError;
pub use snapshot::SnapshotStore;
