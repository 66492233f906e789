//! Computed block-root repository.

use redb::ReadableTable;
use snafu::ResultExt;

use claimtrie_types::{Hash, Height};

use crate::engine::StorageEngine;
use crate::error::{CommitSnafu, Result, StorageSnafu, TableSnafu, TransactionSnafu};
use crate::tables::Tables;

/// Maps block height to the root computed for that block.
pub struct BlockRepo {
    engine: StorageEngine,
}

impl BlockRepo {
    /// Wrap `engine`, creating the block table if needed.
    pub fn new(engine: StorageEngine) -> Result<Self> {
        engine.ensure_table(Tables::BLOCK_HASHES)?;
        Ok(Self { engine })
    }

    /// Record the root computed for `height`.
    pub fn set(&self, height: Height, hash: &Hash) -> Result<()> {
        let db = self.engine.db();
        let txn = db.begin_write().context(TransactionSnafu)?;
        {
            let mut table = txn.open_table(Tables::BLOCK_HASHES).context(TableSnafu)?;
            table
                .insert(height as u32, hash.as_slice())
                .context(StorageSnafu)?;
        }
        txn.commit().context(CommitSnafu)?;
        Ok(())
    }

    /// The root recorded for `height`, if any.
    pub fn get(&self, height: Height) -> Result<Option<Hash>> {
        let db = self.engine.db();
        let txn = db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(Tables::BLOCK_HASHES).context(TableSnafu)?;
        let Some(guard) = table.get(height as u32).context(StorageSnafu)? else {
            return Ok(None);
        };
        let mut hash = [0u8; 32];
        hash.copy_from_slice(guard.value());
        Ok(Some(hash))
    }

    /// The highest recorded height and its root, if any block was committed.
    pub fn load_last(&self) -> Result<Option<(Height, Hash)>> {
        let db = self.engine.db();
        let txn = db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(Tables::BLOCK_HASHES).context(TableSnafu)?;
        let mut iter = table.iter().context(StorageSnafu)?;
        let Some(entry) = iter.next_back() else {
            return Ok(None);
        };
        let (key, value) = entry.context(StorageSnafu)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(value.value());
        Ok(Some((key.value() as Height, hash)))
    }

    /// Discard every root recorded above `height`. Rollback bookkeeping so
    /// the next startup resumes from the reset height.
    pub fn delete_above(&self, height: Height) -> Result<()> {
        let db = self.engine.db();
        let txn = db.begin_write().context(TransactionSnafu)?;
        {
            let mut table = txn.open_table(Tables::BLOCK_HASHES).context(TableSnafu)?;
            let stale: Vec<u32> = table
                .range((height as u32 + 1)..)
                .context(StorageSnafu)?
                .map(|entry| entry.map(|(k, _)| k.value()))
                .collect::<std::result::Result<_, _>>()
                .context(StorageSnafu)?;
            for key in stale {
                table.remove(key).context(StorageSnafu)?;
            }
        }
        txn.commit().context(CommitSnafu)?;
        Ok(())
    }
}
