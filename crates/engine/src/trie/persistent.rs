//! Disk-backed trie.
//!
//! One vertex per name byte, persisted as `(prefix || merkle_hash)` →
//! child list (`byte || hash` entries, then an optional trailing claim
//! hash). Children resolve on demand, so restarting from a stored root
//! costs nothing until names are touched. Pass-through vertices (single
//! child, no value) collapse out of the all-claims hash so both trie
//! implementations report identical roots; each one still persists an alias
//! record at its own prefix to keep resolution walkable.

use std::collections::BTreeMap;

use claimtrie_types::{
    compute_merkle_root, hash_merkle_branches, sha256d, Hash, EMPTY_TRIE_HASH, NO_CHILDREN_HASH,
    NO_CLAIMS_HASH,
};
use claimtrie_storage::TrieRepo;

use super::{HashSidePair, MerkleTrie, Result, StorageSnafu, TrieError};
use snafu::ResultExt;

#[derive(Debug, Default)]
struct Vertex {
    merkle_hash: Option<Hash>,
    claim_hash: Option<Hash>,
    has_value: bool,
    links: BTreeMap<u8, Vertex>,
}

impl Vertex {
    /// Rebuild children and the claim slot from a persisted record.
    ///
    /// Returns false when the record length fits neither the child-list
    /// layout nor the trailing claim slot.
    fn restore(&mut self, record: &[u8]) -> bool {
        let residue = record.len() % 33;
        if residue != 0 && residue != 32 {
            return false;
        }
        let entries = record.len() / 33;
        self.has_value = residue == 32;
        for i in 0..entries {
            let chunk = &record[i * 33..(i + 1) * 33];
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&chunk[1..]);
            self.links.insert(
                chunk[0],
                Vertex {
                    merkle_hash: Some(hash),
                    ..Vertex::default()
                },
            );
        }
        if self.has_value {
            let mut claim = [0u8; 32];
            claim.copy_from_slice(&record[entries * 33..]);
            self.claim_hash = Some(claim);
        }
        true
    }
}

/// Resolve `vertex`'s children from the repository, if it was restored from
/// a root hash and never expanded.
fn resolve(repo: &TrieRepo, vertex: &mut Vertex, prefix: &[u8]) -> Result<()> {
    let Some(hash) = vertex.merkle_hash else {
        return Ok(());
    };
    let mut key = prefix.to_vec();
    key.extend_from_slice(&hash);
    if let Some(record) = repo.get(&key).context(StorageSnafu)? {
        if !vertex.restore(&record) {
            return Err(TrieError::CorruptRecord);
        }
    }
    Ok(())
}

/// The disk-backed trie.
pub struct PersistentTrie {
    repo: TrieRepo,
    root: Vertex,
}

impl PersistentTrie {
    /// Wrap a vertex repository with an empty root.
    pub fn new(repo: TrieRepo) -> Self {
        Self {
            repo,
            root: Vertex::default(),
        }
    }

    fn merkle(repo: &TrieRepo, prefix: &mut Vec<u8>, vertex: &mut Vertex) -> Result<Option<Hash>> {
        if let Some(h) = vertex.merkle_hash {
            return Ok(Some(h));
        }

        let mut buf: Vec<u8> = Vec::new();
        for (&ch, child) in vertex.links.iter_mut() {
            prefix.push(ch);
            let child_hash = Self::merkle(repo, prefix, child)?;
            prefix.pop();
            if let Some(h) = child_hash {
                buf.push(ch);
                buf.extend_from_slice(&h);
            }
        }
        if vertex.has_value {
            if let Some(claim) = vertex.claim_hash {
                buf.extend_from_slice(&claim);
            }
        }
        if !buf.is_empty() {
            let h = sha256d(&buf);
            vertex.merkle_hash = Some(h);
            let mut key = prefix.clone();
            key.extend_from_slice(&h);
            repo.set(&key, &buf).context(StorageSnafu)?;
        }
        Ok(vertex.merkle_hash)
    }

    fn merkle_all(
        repo: &TrieRepo,
        prefix: &mut Vec<u8>,
        vertex: &mut Vertex,
        is_root: bool,
    ) -> Result<Option<Hash>> {
        if let Some(h) = vertex.merkle_hash {
            return Ok(Some(h));
        }

        let mut buf: Vec<u8> = Vec::new();
        let mut child_hashes: Vec<Hash> = Vec::new();
        for (&ch, child) in vertex.links.iter_mut() {
            prefix.push(ch);
            let child_hash = Self::merkle_all(repo, prefix, child, false)?;
            prefix.pop();
            if let Some(h) = child_hash {
                buf.push(ch);
                buf.extend_from_slice(&h);
                child_hashes.push(h);
            }
        }

        let claim = vertex.claim_hash.filter(|_| vertex.has_value);
        if claim.is_none() {
            if child_hashes.is_empty() {
                return Ok(None);
            }
            if child_hashes.len() == 1 && !is_root {
                // Pass-through vertex: report the child's hash, keep an
                // alias record so resolution can walk through.
                let h = child_hashes[0];
                vertex.merkle_hash = Some(h);
                let mut key = prefix.clone();
                key.extend_from_slice(&h);
                repo.set(&key, &buf).context(StorageSnafu)?;
                return Ok(vertex.merkle_hash);
            }
        }

        let child_root = compute_merkle_root(&child_hashes).unwrap_or(NO_CHILDREN_HASH);
        let claim_root = claim.unwrap_or(NO_CLAIMS_HASH);
        let h = hash_merkle_branches(&child_root, &claim_root);
        vertex.merkle_hash = Some(h);

        if let Some(claim) = claim {
            buf.extend_from_slice(&claim);
        }
        let mut key = prefix.clone();
        key.extend_from_slice(&h);
        repo.set(&key, &buf).context(StorageSnafu)?;
        Ok(vertex.merkle_hash)
    }
}

impl MerkleTrie for PersistentTrie {
    fn set_root(&mut self, hash: &Hash) -> Result<()> {
        if *hash == EMPTY_TRIE_HASH {
            self.root = Vertex::default();
            return Ok(());
        }
        // The record stored under the root hash is its preimage. Restore it
        // and leave the memoized hash unset: the next root computation
        // re-derives the hash from the record, so a stale, truncated, or
        // corrupt store fails the caller's verification instead of echoing
        // the requested hash back. A missing or unparseable record demands
        // a replay from the change log.
        let Some(record) = self.repo.get(hash).context(StorageSnafu)? else {
            return Err(TrieError::FullRebuildRequired);
        };
        let mut root = Vertex::default();
        if !root.restore(&record) {
            return Err(TrieError::FullRebuildRequired);
        }
        self.root = root;
        Ok(())
    }

    fn update(&mut self, name: &[u8], hash: Option<Hash>, restore_children: bool) -> Result<()> {
        let Self { repo, root } = self;
        let mut vertex: &mut Vertex = root;
        for (i, &ch) in name.iter().enumerate() {
            if restore_children && vertex.links.is_empty() {
                resolve(repo, vertex, &name[..i])?;
            }
            vertex.merkle_hash = None;
            vertex = vertex.links.entry(ch).or_default();
        }
        if restore_children && vertex.links.is_empty() {
            resolve(repo, vertex, name)?;
        }
        vertex.merkle_hash = None;
        vertex.claim_hash = hash;
        vertex.has_value = hash.is_some();
        Ok(())
    }

    fn merkle_hash(&mut self) -> Result<Hash> {
        let mut prefix = Vec::new();
        Ok(Self::merkle(&self.repo, &mut prefix, &mut self.root)?.unwrap_or(EMPTY_TRIE_HASH))
    }

    fn merkle_hash_all_claims(&mut self) -> Result<Hash> {
        let mut prefix = Vec::new();
        Ok(
            Self::merkle_all(&self.repo, &mut prefix, &mut self.root, true)?
                .unwrap_or(EMPTY_TRIE_HASH),
        )
    }

    fn merkle_path(&mut self, _name: &[u8]) -> Result<Vec<HashSidePair>> {
        Err(TrieError::ProofsUnsupported)
    }
}
