//! Unified error type for the ClaimTrie engine.

use snafu::Snafu;

use crate::hash::Hash;
use crate::types::Height;

/// Unified result type for engine operations.
pub type Result<T, E = ClaimTrieError> = std::result::Result<T, E>;

/// Top-level error type for engine operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClaimTrieError {
    /// A claim name exceeded the 255-byte cap.
    #[snafu(display("Name of {len} bytes exceeds the 255-byte limit"))]
    NameTooLong {
        /// Length of the rejected name.
        len: usize,
    },

    /// A recomputed root disagreed with the committed one. Always fatal.
    #[snafu(display(
        "Hash mismatch at height {height}: expected {expected:02x?}, got {actual:02x?}"
    ))]
    HashMismatch {
        /// Height whose root was verified.
        height: Height,
        /// Root recorded in the block repository.
        expected: Hash,
        /// Root recomputed from state.
        actual: Hash,
    },

    /// A rollback target has no committed root to restore.
    #[snafu(display("No committed root at height {height} to roll back to"))]
    RollbackPastCommitted {
        /// The requested rollback height.
        height: Height,
    },

    /// A height argument violated the caller's contract.
    #[snafu(display("Invalid height {height}: {message}"))]
    InvalidHeight {
        /// The offending height.
        height: Height,
        /// What the contract required.
        message: String,
    },

    /// A queried name has no live node.
    #[snafu(display("Name not found: {name}"))]
    NotFound {
        /// Display form of the queried name.
        name: String,
    },

    /// Two claims landed on the same transaction output.
    #[snafu(display("Claim conflicts with an existing claim at output {out_point}"))]
    OutPointConflict {
        /// Display form of the contested output.
        out_point: String,
    },

    /// Storage layer failure.
    #[snafu(display("Storage error: {message}"))]
    Storage {
        /// Description of the underlying failure.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClaimTrieError::NameTooLong { len: 300 };
        assert_eq!(err.to_string(), "Name of 300 bytes exceeds the 255-byte limit");

        let err = ClaimTrieError::RollbackPastCommitted { height: 12 };
        assert_eq!(err.to_string(), "No committed root at height 12 to roll back to");
    }
}
