//! LMDB implementation of SnapshotStore.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use heed::types::{Bytes, Str};
use heed::{Database, Env};

use rota_store::{SnapshotStore, StoreError};

use crate::LmdbError;

const LEDGER_STATE_KEY: &str = "ledger_state";

pub struct LmdbSnapshotStore {
    env: Arc<Env>,
    snapshot_db: Database<Str, Bytes>,
    closed: AtomicBool,
}

impl LmdbSnapshotStore {
    pub(crate) fn new(env: Arc<Env>, snapshot_db: Database<Str, Bytes>) -> Self {
        Self {
            env,
            snapshot_db,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl SnapshotStore for LmdbSnapshotStore {
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_open()?;
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self
            .snapshot_db
            .get(&rtxn, LEDGER_STATE_KEY)
            .map_err(LmdbError::from)?;
        Ok(val.map(<[u8]>::to_vec))
    }

    fn save(&self, snapshot: &[u8]) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.snapshot_db
            .put(&mut wtxn, LEDGER_STATE_KEY, snapshot)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        tracing::trace!(bytes = snapshot.len(), "snapshot written");
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.env.force_sync().map_err(LmdbError::from)?;
        Ok(())
    }
}
