//! Temporal index repository.
//!
//! Maps a height to the set of names whose node state may change at that
//! height (pending activations and expirations). Key layout:
//! `be32 height || 0x00 || name`, empty value.

use std::ops::Bound;

use redb::ReadableTable;
use snafu::ResultExt;

use claimtrie_types::Height;

use crate::engine::StorageEngine;
use crate::error::{CommitSnafu, Result, StorageSnafu, TableSnafu, TransactionSnafu};
use crate::tables::Tables;

/// Height → names schedule for node refreshes.
pub struct TemporalRepo {
    engine: StorageEngine,
}

impl TemporalRepo {
    /// Wrap `engine`, creating the temporal table if needed.
    pub fn new(engine: StorageEngine) -> Result<Self> {
        engine.ensure_table(Tables::TEMPORAL)?;
        Ok(Self { engine })
    }

    /// Register each `names[i]` for a refresh at `heights[i]`, in one batch.
    pub fn set_nodes_at(&self, names: &[Vec<u8>], heights: &[Height]) -> Result<()> {
        debug_assert_eq!(names.len(), heights.len());
        if names.is_empty() {
            return Ok(());
        }
        let db = self.engine.db();
        let txn = db.begin_write().context(TransactionSnafu)?;
        {
            let mut table = txn.open_table(Tables::TEMPORAL).context(TableSnafu)?;
            for (name, height) in names.iter().zip(heights) {
                let key = encode_key(*height, name);
                table.insert(key.as_slice(), ()).context(StorageSnafu)?;
            }
        }
        txn.commit().context(CommitSnafu)?;
        Ok(())
    }

    /// The names registered for a refresh at `height`, in key order.
    pub fn nodes_at(&self, height: Height) -> Result<Vec<Vec<u8>>> {
        let lower = encode_key(height, &[]);
        let mut upper = (height as u32).to_be_bytes().to_vec();
        upper.push(1);

        let db = self.engine.db();
        let txn = db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(Tables::TEMPORAL).context(TableSnafu)?;
        let range = table
            .range::<&[u8]>((
                Bound::Included(lower.as_slice()),
                Bound::Excluded(upper.as_slice()),
            ))
            .context(StorageSnafu)?;

        let mut names = Vec::new();
        for entry in range {
            let (key, _) = entry.context(StorageSnafu)?;
            names.push(key.value()[5..].to_vec());
        }
        Ok(names)
    }
}

fn encode_key(height: Height, name: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(5 + name.len());
    key.extend_from_slice(&(height as u32).to_be_bytes());
    key.push(0);
    key.extend_from_slice(name);
    key
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn repo() -> TemporalRepo {
        TemporalRepo::new(StorageEngine::in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_set_and_query() {
        let repo = repo();
        repo.set_nodes_at(
            &[b"b".to_vec(), b"a".to_vec(), b"c".to_vec()],
            &[5, 5, 6],
        )
        .unwrap();

        assert_eq!(repo.nodes_at(5).unwrap(), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(repo.nodes_at(6).unwrap(), vec![b"c".to_vec()]);
        assert!(repo.nodes_at(7).unwrap().is_empty());
    }

    #[test]
    fn test_registration_is_idempotent() {
        let repo = repo();
        repo.set_nodes_at(&[b"a".to_vec()], &[5]).unwrap();
        repo.set_nodes_at(&[b"a".to_vec()], &[5]).unwrap();
        assert_eq!(repo.nodes_at(5).unwrap().len(), 1);
    }

    #[test]
    fn test_heights_do_not_bleed() {
        let repo = repo();
        // A name registered at adjacent heights stays separate.
        repo.set_nodes_at(&[b"name".to_vec(), b"name".to_vec()], &[1, 2])
            .unwrap();
        assert_eq!(repo.nodes_at(1).unwrap().len(), 1);
        assert_eq!(repo.nodes_at(2).unwrap().len(), 1);
        assert!(repo.nodes_at(3).unwrap().is_empty());
    }
}
