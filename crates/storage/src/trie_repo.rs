//! Trie vertex repository for the disk-backed trie.
//!
//! Key = `prefix || merkle_hash`, value = the serialized child list plus an
//! optional trailing claim hash. Vertices are immutable once written; a
//! changed vertex gets a new hash and therefore a new key.

use redb::ReadableTable;
use snafu::ResultExt;

use crate::engine::StorageEngine;
use crate::error::{CommitSnafu, Result, StorageSnafu, TableSnafu, TransactionSnafu};
use crate::tables::Tables;

/// Content-addressed vertex store.
pub struct TrieRepo {
    engine: StorageEngine,
}

impl TrieRepo {
    /// Wrap `engine`, creating the vertex table if needed.
    pub fn new(engine: StorageEngine) -> Result<Self> {
        engine.ensure_table(Tables::TRIE_NODES)?;
        Ok(Self { engine })
    }

    /// Persist a vertex serialization under `key`.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let db = self.engine.db();
        let txn = db.begin_write().context(TransactionSnafu)?;
        {
            let mut table = txn.open_table(Tables::TRIE_NODES).context(TableSnafu)?;
            table.insert(key, value).context(StorageSnafu)?;
        }
        txn.commit().context(CommitSnafu)?;
        Ok(())
    }

    /// Fetch a vertex serialization, if present.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let db = self.engine.db();
        let txn = db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(Tables::TRIE_NODES).context(TableSnafu)?;
        Ok(table
            .get(key)
            .context(StorageSnafu)?
            .map(|guard| guard.value().to_vec()))
    }
}
