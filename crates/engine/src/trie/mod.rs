//! The Merkle trie over names.
//!
//! A 256-ary radix trie keyed by name bytes. Two implementations produce
//! identical roots: [`RamTrie`] keeps a collapsed-edge trie in memory and is
//! the preferred one; [`PersistentTrie`] persists vertex serializations and
//! resolves them on demand, trading memory for disk reads.

mod collapsed;
mod persistent;
mod ram;

pub use persistent::PersistentTrie;
pub use ram::RamTrie;

use snafu::Snafu;

use claimtrie_types::{ClaimTrieError, Hash};

/// One step of a name proof: the sibling hash and which side the running
/// hash sits on when combining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSidePair {
    /// True when the running hash is the right operand.
    pub right: bool,
    /// The sibling hash to combine with.
    pub hash: Hash,
}

/// Error type for trie operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TrieError {
    /// The requested root cannot be restored in place; the caller must
    /// replay the touched names.
    #[snafu(display("A full rebuild is required"))]
    FullRebuildRequired,

    /// Proof generation is only available on the in-memory trie.
    #[snafu(display("Merkle proofs require the in-memory trie"))]
    ProofsUnsupported,

    /// A persisted vertex record does not parse.
    #[snafu(display("Corrupt trie vertex record"))]
    CorruptRecord,

    /// The vertex store failed.
    #[snafu(display("Trie storage error: {source}"))]
    Storage {
        /// The underlying repository error.
        source: claimtrie_storage::StoreError,
    },
}

impl From<TrieError> for ClaimTrieError {
    fn from(err: TrieError) -> Self {
        ClaimTrieError::Storage {
            message: err.to_string(),
        }
    }
}

/// Result type for trie operations.
pub type Result<T> = std::result::Result<T, TrieError>;

/// The trie surface the facade drives.
pub trait MerkleTrie: Send + Sync {
    /// Drop in-memory state and restore the trie to the given root.
    ///
    /// Implementations must not take the hash on faith: after a successful
    /// restore, the next root computation re-derives the hash from actual
    /// state so the caller's verification is meaningful. Fails with
    /// [`TrieError::FullRebuildRequired`] when the implementation cannot
    /// restore in place; the caller then replays name updates.
    fn set_root(&mut self, hash: &Hash) -> Result<()>;

    /// Set or clear the value hash for `name`, dirtying the path to it.
    ///
    /// `restore_children` asks a disk-backed trie to re-resolve collapsed
    /// children along the path before dirtying.
    fn update(&mut self, name: &[u8], hash: Option<Hash>, restore_children: bool) -> Result<()>;

    /// The pre-fork root. Memoized; idempotent between updates.
    fn merkle_hash(&mut self) -> Result<Hash>;

    /// The post-fork (all-claims) root. Memoized; idempotent between updates.
    fn merkle_hash_all_claims(&mut self) -> Result<Hash>;

    /// The vertex-level proof path for `name` under all-claims hashing.
    fn merkle_path(&mut self, name: &[u8]) -> Result<Vec<HashSidePair>>;
}
