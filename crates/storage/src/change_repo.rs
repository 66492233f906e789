//! Per-name change log repository.
//!
//! Key = raw name bytes, value = concatenation of consensus-serialized
//! change records in arrival order. Loads re-sort stably by height because
//! the normalization-fork migration appends records bearing earlier heights.

use std::collections::BTreeMap;
use std::ops::Bound;

use redb::ReadableTable;
use snafu::ResultExt;

use claimtrie_types::codec::{decode_changes, encode_change};
use claimtrie_types::Change;

use crate::engine::StorageEngine;
use crate::error::{
    CommitSnafu, CorruptSnafu, Result, StorageSnafu, TableSnafu, TransactionSnafu,
};
use crate::tables::Tables;

/// Append-only per-name change log.
pub struct ChangeRepo {
    engine: StorageEngine,
}

impl ChangeRepo {
    /// Wrap `engine`, creating the change table if needed.
    pub fn new(engine: StorageEngine) -> Result<Self> {
        engine.ensure_table(Tables::CHANGES)?;
        Ok(Self { engine })
    }

    /// Merge-append `changes` in arrival order, atomically.
    ///
    /// Records for one name must arrive in chronological order; that is the
    /// caller's responsibility within a block.
    pub fn append_changes(&self, changes: &[Change]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        // Group the encoded suffix per name, preserving arrival order.
        let mut appends: BTreeMap<&[u8], Vec<u8>> = BTreeMap::new();
        for chg in changes {
            encode_change(chg, appends.entry(&chg.name).or_default());
        }

        let db = self.engine.db();
        let txn = db.begin_write().context(TransactionSnafu)?;
        {
            let mut table = txn.open_table(Tables::CHANGES).context(TableSnafu)?;
            for (name, suffix) in appends {
                let mut merged = match table.get(name).context(StorageSnafu)? {
                    Some(guard) => guard.value().to_vec(),
                    None => Vec::new(),
                };
                merged.extend_from_slice(&suffix);
                table.insert(name, merged.as_slice()).context(StorageSnafu)?;
            }
        }
        txn.commit().context(CommitSnafu)?;
        Ok(())
    }

    /// All changes recorded for `name`, stable-sorted by height.
    pub fn load_changes(&self, name: &[u8]) -> Result<Vec<Change>> {
        let db = self.engine.db();
        let txn = db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(Tables::CHANGES).context(TableSnafu)?;
        match table.get(name).context(StorageSnafu)? {
            Some(guard) => decode_changes(name, guard.value()).context(CorruptSnafu {
                key: String::from_utf8_lossy(name).into_owned(),
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Truncate the log for `name` to records with `height <= final_height`.
    ///
    /// Records whose `visible_height` exceeds `final_height` go too: those
    /// were synthesized by the normalization-fork migration under their
    /// original heights, and rolling back below the fork must un-make them.
    pub fn drop_changes(&self, name: &[u8], final_height: i32) -> Result<()> {
        let mut changes = self.load_changes(name)?;
        changes.retain(|c| c.height <= final_height && c.visible_height <= final_height);

        let mut merged = Vec::new();
        for chg in &changes {
            encode_change(chg, &mut merged);
        }

        let db = self.engine.db();
        let txn = db.begin_write().context(TransactionSnafu)?;
        {
            let mut table = txn.open_table(Tables::CHANGES).context(TableSnafu)?;
            if merged.is_empty() {
                table.remove(name).context(StorageSnafu)?;
            } else {
                table.insert(name, merged.as_slice()).context(StorageSnafu)?;
            }
        }
        txn.commit().context(CommitSnafu)?;
        Ok(())
    }

    /// Invoke `f` with the changes of every name that strictly extends
    /// `name`, in key order, until `f` returns false.
    pub fn iterate_children(
        &self,
        name: &[u8],
        f: &mut dyn FnMut(Vec<Change>) -> bool,
    ) -> Result<()> {
        // The smallest strict extension is name || 0x00.
        let mut lower = name.to_vec();
        lower.push(0);
        let upper = key_upper_bound(name);

        let db = self.engine.db();
        let txn = db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(Tables::CHANGES).context(TableSnafu)?;
        let upper_bound = match &upper {
            Some(k) => Bound::Excluded(k.as_slice()),
            None => Bound::Unbounded,
        };
        let range = table
            .range::<&[u8]>((Bound::Included(lower.as_slice()), upper_bound))
            .context(StorageSnafu)?;
        for entry in range {
            let (key, value) = entry.context(StorageSnafu)?;
            let child = key.value().to_vec();
            let changes = decode_changes(&child, value.value()).context(CorruptSnafu {
                key: String::from_utf8_lossy(&child).into_owned(),
            })?;
            if !f(changes) {
                break;
            }
        }
        Ok(())
    }

    /// Invoke `predicate` with every recorded name until it returns false.
    pub fn iterate_all(&self, predicate: &mut dyn FnMut(&[u8]) -> bool) -> Result<()> {
        let db = self.engine.db();
        let txn = db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(Tables::CHANGES).context(TableSnafu)?;
        for entry in table.iter().context(StorageSnafu)? {
            let (key, _) = entry.context(StorageSnafu)?;
            if !predicate(key.value()) {
                break;
            }
        }
        Ok(())
    }
}

/// The smallest key strictly greater than every key prefixed by `prefix`,
/// or `None` when no such bound exists (all-0xff prefixes).
fn key_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last != 0xff {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None
}
