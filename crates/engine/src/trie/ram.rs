//! In-memory trie with collapsed edges.
//!
//! Pre-fork hashing folds each collapsed edge's bytes back into the child
//! hash; post-fork hashing combines a merkle root over child hashes with the
//! per-name claim root, using the reserved sentinels when either side is
//! absent.

use claimtrie_types::{
    compute_merkle_path, compute_merkle_root, hash_merkle_branches, sha256d, Hash,
    EMPTY_TRIE_HASH, NO_CHILDREN_HASH, NO_CLAIMS_HASH,
};

use super::collapsed::{CollapsedTrie, CollapsedVertex};
use super::{HashSidePair, MerkleTrie, Result, TrieError};

/// The in-memory trie.
#[derive(Debug, Default)]
pub struct RamTrie {
    trie: CollapsedTrie,
}

impl RamTrie {
    /// A fresh, empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    fn merkle(vertex: &mut CollapsedVertex) -> Option<Hash> {
        if let Some(h) = vertex.merkle_hash {
            return Some(h);
        }

        let mut buf: Vec<u8> = Vec::new();
        for child in &mut vertex.children {
            let first = child.key[0];
            let key = child.key.clone();
            if let Some(h) = Self::merkle(child) {
                buf.push(first);
                buf.extend_from_slice(&complete_hash(&h, &key));
            }
        }
        if let Some(claim) = vertex.claim_hash {
            buf.extend_from_slice(&claim);
        }
        if !buf.is_empty() {
            vertex.merkle_hash = Some(sha256d(&buf));
        }
        vertex.merkle_hash
    }

    fn merkle_all_claims(vertex: &mut CollapsedVertex) -> Option<Hash> {
        if let Some(h) = vertex.merkle_hash {
            return Some(h);
        }

        let (child_hash, has_children) = Self::child_hash(vertex);
        let claim_hash = match vertex.claim_hash {
            Some(h) => h,
            None if !has_children => return None,
            None => NO_CLAIMS_HASH,
        };

        vertex.merkle_hash = Some(hash_merkle_branches(&child_hash, &claim_hash));
        vertex.merkle_hash
    }

    fn child_hash(vertex: &mut CollapsedVertex) -> (Hash, bool) {
        let child_hashes: Vec<Hash> = vertex
            .children
            .iter_mut()
            .filter_map(Self::merkle_all_claims)
            .collect();
        match compute_merkle_root(&child_hashes) {
            Some(h) => (h, true),
            None => (NO_CHILDREN_HASH, false),
        }
    }
}

/// Fold a collapsed edge's trailing bytes back into the child hash, right
/// to left, leaving the first byte for the parent's serialization.
fn complete_hash(h: &Hash, child_key: &[u8]) -> Hash {
    let mut data = [0u8; 33];
    data[1..].copy_from_slice(h);
    for i in (1..child_key.len()).rev() {
        data[0] = child_key[i];
        let folded = sha256d(&data);
        data[1..].copy_from_slice(&folded);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&data[1..]);
    out
}

impl MerkleTrie for RamTrie {
    fn set_root(&mut self, hash: &Hash) -> Result<()> {
        if self.trie.root.merkle_hash == Some(*hash) {
            return Ok(());
        }
        // Abused for partial rebuilds on rollback: the caller replays the
        // affected names instead of clearing the trie.
        Err(TrieError::FullRebuildRequired)
    }

    fn update(&mut self, name: &[u8], hash: Option<Hash>, _restore_children: bool) -> Result<()> {
        match hash {
            None => {
                self.trie.erase(name);
            }
            Some(h) => {
                let (_, vertex) = self.trie.insert_or_find(name);
                vertex.claim_hash = Some(h);
                vertex.merkle_hash = None;
            }
        }
        Ok(())
    }

    fn merkle_hash(&mut self) -> Result<Hash> {
        Ok(Self::merkle(&mut self.trie.root).unwrap_or(EMPTY_TRIE_HASH))
    }

    fn merkle_hash_all_claims(&mut self) -> Result<Hash> {
        Ok(Self::merkle_all_claims(&mut self.trie.root).unwrap_or(EMPTY_TRIE_HASH))
    }

    fn merkle_path(&mut self, name: &[u8]) -> Result<Vec<HashSidePair>> {
        // Materialize the memoized hashes first.
        self.merkle_hash_all_claims()?;

        let mut results = Vec::new();
        let Some((indexes, path)) = self.trie.find_path(name) else {
            return Ok(results);
        };

        for i in 0..indexes.len() {
            if i == indexes.len() - 1 {
                // Terminal vertex: the sibling is the child root; the claim
                // root sits on the right.
                let child_hashes: Vec<Hash> = path[i]
                    .children
                    .iter()
                    .filter_map(|c| c.merkle_hash)
                    .collect();
                let child_hash =
                    compute_merkle_root(&child_hashes).unwrap_or(NO_CHILDREN_HASH);
                results.push(HashSidePair {
                    right: true,
                    hash: child_hash,
                });
            } else {
                let claim_hash = path[i].claim_hash.unwrap_or(NO_CLAIMS_HASH);
                results.push(HashSidePair {
                    right: false,
                    hash: claim_hash,
                });
                let child_hashes: Vec<Hash> = path[i]
                    .children
                    .iter()
                    .filter_map(|c| c.merkle_hash)
                    .collect();
                if !child_hashes.is_empty() {
                    let child_index = indexes[i + 1] as usize;
                    let partials = compute_merkle_path(&child_hashes, child_index);
                    for j in (0..partials.len()).rev() {
                        results.push(HashSidePair {
                            right: ((child_index >> j) & 1) > 0,
                            hash: partials[j],
                        });
                    }
                }
            }
        }
        Ok(results)
    }
}
