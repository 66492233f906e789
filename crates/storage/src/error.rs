//! Storage error types.

use claimtrie_types::codec::CodecError;
use claimtrie_types::ClaimTrieError;
use snafu::Snafu;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type shared by the repositories.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// Database open failed.
    #[snafu(display("Failed to open database at {path}: {source}"))]
    Open {
        /// Database path.
        path: String,
        /// The underlying redb error.
        source: redb::DatabaseError,
    },

    /// Beginning a transaction failed.
    #[snafu(display("Transaction error: {source}"))]
    Transaction {
        /// The underlying redb error.
        source: redb::TransactionError,
    },

    /// Opening a table failed.
    #[snafu(display("Table error: {source}"))]
    Table {
        /// The underlying redb error.
        source: redb::TableError,
    },

    /// A read or write on a table failed.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// The underlying redb error.
        source: redb::StorageError,
    },

    /// Committing a transaction failed.
    #[snafu(display("Commit error: {source}"))]
    Commit {
        /// The underlying redb error.
        source: redb::CommitError,
    },

    /// A persisted record failed to decode.
    #[snafu(display("Corrupt record for key {key}: {source}"))]
    Corrupt {
        /// Display form of the offending key.
        key: String,
        /// The underlying codec error.
        source: CodecError,
    },
}

impl From<StoreError> for ClaimTrieError {
    fn from(err: StoreError) -> Self {
        ClaimTrieError::Storage {
            message: err.to_string(),
        }
    }
}
