//! redb engine wrapper.
//!
//! Thin wrapper around `redb::Database` providing file-backed and in-memory
//! constructors. Each repository creates its tables eagerly at construction
//! so read transactions never observe a missing table.

use std::path::Path;
use std::sync::Arc;

use redb::backends::InMemoryBackend;
use redb::{Database, TableDefinition};
use snafu::ResultExt;

use crate::error::{CommitSnafu, OpenSnafu, Result, TableSnafu, TransactionSnafu};

/// Storage engine holding one redb database.
#[derive(Clone)]
pub struct StorageEngine {
    db: Arc<Database>,
}

impl StorageEngine {
    /// Open or create a database file at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path).context(OpenSnafu {
            path: path.display().to_string(),
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Create a fresh in-memory database for tests.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .context(OpenSnafu {
                path: ":memory:".to_string(),
            })?;
        Ok(Self { db: Arc::new(db) })
    }

    /// The shared database handle.
    pub fn db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    /// Create `table` if it does not exist yet.
    pub(crate) fn ensure_table<K, V>(&self, table: TableDefinition<'_, K, V>) -> Result<()>
    where
        K: redb::Key + 'static,
        V: redb::Value + 'static,
    {
        let txn = self.db.begin_write().context(TransactionSnafu)?;
        txn.open_table(table).context(TableSnafu)?;
        txn.commit().context(CommitSnafu)?;
        Ok(())
    }
}
