//! LMDB storage backend for the rota ledger.
//!
//! Implements [`rota_store::SnapshotStore`] using the `heed` LMDB bindings.
//! One environment holds two databases: `snapshot` (the ledger state) and
//! `meta` (schema version).

pub mod environment;
pub mod error;
pub mod meta;
pub mod snapshot;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use snapshot::LmdbSnapshotStore;
