//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use crate::meta::{LmdbMetaStore, SCHEMA_VERSION};
use crate::snapshot::LmdbSnapshotStore;
use crate::LmdbError;

/// Default map size: 1 GiB. The snapshot is rewritten in place, so the map
/// only needs to hold a few copies of the ledger.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

const MAX_DBS: u32 = 4;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    snapshot_db: Database<Str, Bytes>,
    meta_db: Database<Str, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment in directory `path`.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: each data directory is opened by exactly one environment
        // per process; the node owns its data_dir exclusively.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let snapshot_db = env.create_database::<Str, Bytes>(&mut wtxn, Some("snapshot"))?;
        let meta_db = env.create_database::<Str, Bytes>(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        let environment = Self {
            env: Arc::new(env),
            snapshot_db,
            meta_db,
        };

        let meta = environment.meta_store();
        match meta.schema_version()? {
            None => meta.set_schema_version(SCHEMA_VERSION)?,
            Some(SCHEMA_VERSION) => {}
            Some(found) => {
                return Err(LmdbError::SchemaVersion {
                    found,
                    expected: SCHEMA_VERSION,
                })
            }
        }

        tracing::debug!(path = %path.display(), map_size, "opened LMDB environment");
        Ok(environment)
    }

    pub fn snapshot_store(&self) -> LmdbSnapshotStore {
        LmdbSnapshotStore::new(Arc::clone(&self.env), self.snapshot_db)
    }

    pub fn meta_store(&self) -> LmdbMetaStore {
        LmdbMetaStore {
            env: Arc::clone(&self.env),
            meta_db: self.meta_db,
        }
    }
}
